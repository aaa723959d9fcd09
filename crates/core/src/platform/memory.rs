//! In-process platform simulation
//!
//! Keeps properties in a map and treats a reset as "drop everything that is
//! not NON_VOLATILE". Failure injection hooks let tests exercise the
//! persistence and reset error paths.

use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use super::{Attributes, Platform, PlatformError, Property, PropertyError, ResetKind};

/// In-memory [`Platform`]
#[derive(Debug, Default, Clone)]
pub struct MemoryPlatform {
    properties: BTreeMap<(String, String), Property>,
    protected: HashSet<(String, String)>,
    write_failure: Option<PropertyError>,
    unsupported_resets: HashSet<ResetKind>,
    refuse_resets: bool,
    resets: Vec<ResetKind>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `error` until cleared
    pub fn fail_writes(&mut self, error: Option<PropertyError>) {
        self.write_failure = error;
    }

    /// Reject writes to one property with `AccessDenied`
    pub fn protect(&mut self, namespace: &str, name: &str) {
        self.protected
            .insert((namespace.to_string(), name.to_string()));
    }

    /// Mark a reset kind as unsupported
    pub fn disable_reset(&mut self, kind: ResetKind) {
        self.unsupported_resets.insert(kind);
    }

    /// Refuse every reset even though `supports_reset` says yes
    pub fn refuse_resets(&mut self, refuse: bool) {
        self.refuse_resets = refuse;
    }

    /// Every reset performed so far, oldest first
    pub fn resets(&self) -> &[ResetKind] {
        &self.resets
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.properties
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    /// Overwrite a property bypassing protection and failure injection
    pub fn insert_raw(&mut self, namespace: &str, name: &str, property: Property) {
        self.properties
            .insert((namespace.to_string(), name.to_string()), property);
    }
}

impl Platform for MemoryPlatform {
    fn get_property(&self, namespace: &str, name: &str) -> Result<Property, PropertyError> {
        self.properties
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or(PropertyError::NotFound)
    }

    fn set_property(
        &mut self,
        namespace: &str,
        name: &str,
        attributes: Attributes,
        value: &[u8],
    ) -> Result<(), PropertyError> {
        if let Some(err) = &self.write_failure {
            return Err(err.clone());
        }

        let key = (namespace.to_string(), name.to_string());
        if self.protected.contains(&key) {
            return Err(PropertyError::AccessDenied);
        }

        if value.is_empty() {
            return self
                .properties
                .remove(&key)
                .map(|_| ())
                .ok_or(PropertyError::NotFound);
        }

        self.properties.insert(
            key,
            Property {
                attributes,
                value: value.to_vec(),
            },
        );
        Ok(())
    }

    fn supports_reset(&self, kind: ResetKind) -> bool {
        !self.unsupported_resets.contains(&kind)
    }

    fn reset(&mut self, kind: ResetKind) -> Result<(), PlatformError> {
        if !self.supports_reset(kind) {
            return Err(PlatformError::Unsupported(kind.to_string()));
        }
        if self.refuse_resets {
            return Err(PlatformError::Refused(format!("{kind} reset refused")));
        }

        let before = self.properties.len();
        self.properties
            .retain(|_, p| p.attributes.contains(Attributes::NON_VOLATILE));
        self.resets.push(kind);

        debug!(
            "Simulated {} reset dropped {} volatile properties",
            kind,
            before - self.properties.len()
        );
        Ok(())
    }
}
