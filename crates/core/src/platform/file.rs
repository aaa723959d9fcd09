//! File-backed platform simulation
//!
//! Lets a host application exercise the full suspend/relaunch cycle across
//! real process boundaries. Properties live in a JSON document that is
//! rewritten atomically (temp file then rename) on every change, so a crash
//! mid-write leaves the previous document intact.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Attributes, Platform, PlatformError, Property, PropertyError, ResetKind};
use crate::Result;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    properties: BTreeMap<String, StoredProperty>,
    #[serde(default)]
    resets: Vec<ResetKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredProperty {
    attributes: Attributes,
    #[serde(with = "hex_bytes")]
    value: Vec<u8>,
}

/// [`Platform`] persisted to a JSON file
#[derive(Debug)]
pub struct FilePlatform {
    path: PathBuf,
    doc: Document,
}

impl FilePlatform {
    /// Open the document at `path`, starting empty if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let doc = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Document::default()
        };

        debug!("Opened platform state at {:?} ({} properties)", path, doc.properties.len());
        Ok(Self { path, doc })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every reset performed against this document, oldest first
    pub fn resets(&self) -> &[ResetKind] {
        &self.doc.resets
    }

    /// All properties, keyed as `namespace/name`
    pub fn properties(&self) -> impl Iterator<Item = (&str, Property)> + '_ {
        self.doc.properties.iter().map(|(key, stored)| {
            (
                key.as_str(),
                Property {
                    attributes: stored.attributes,
                    value: stored.value.clone(),
                },
            )
        })
    }

    fn key(namespace: &str, name: &str) -> String {
        format!("{namespace}/{name}")
    }

    fn commit(&mut self, doc: Document) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec_pretty(&doc).map_err(std::io::Error::other)?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;

        self.doc = doc;
        Ok(())
    }
}

impl Platform for FilePlatform {
    fn get_property(&self, namespace: &str, name: &str) -> std::result::Result<Property, PropertyError> {
        self.doc
            .properties
            .get(&Self::key(namespace, name))
            .map(|stored| Property {
                attributes: stored.attributes,
                value: stored.value.clone(),
            })
            .ok_or(PropertyError::NotFound)
    }

    fn set_property(
        &mut self,
        namespace: &str,
        name: &str,
        attributes: Attributes,
        value: &[u8],
    ) -> std::result::Result<(), PropertyError> {
        let key = Self::key(namespace, name);
        let mut doc = self.doc.clone();

        if value.is_empty() {
            if doc.properties.remove(&key).is_none() {
                return Err(PropertyError::NotFound);
            }
        } else {
            doc.properties.insert(
                key,
                StoredProperty {
                    attributes,
                    value: value.to_vec(),
                },
            );
        }

        self.commit(doc)
            .map_err(|e| PropertyError::Device(e.to_string()))
    }

    fn supports_reset(&self, kind: ResetKind) -> bool {
        kind != ResetKind::PlatformSpecific
    }

    fn reset(&mut self, kind: ResetKind) -> std::result::Result<(), PlatformError> {
        if !self.supports_reset(kind) {
            return Err(PlatformError::Unsupported(kind.to_string()));
        }

        let mut doc = self.doc.clone();
        doc.properties
            .retain(|_, p| p.attributes.contains(Attributes::NON_VOLATILE));
        doc.resets.push(kind);

        self.commit(doc)
            .map_err(|e| PlatformError::Refused(format!("could not persist platform state: {e}")))?;

        info!("Simulated {} reset recorded in {:?}; relaunch to continue", kind, self.path);
        Ok(())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("platform.json");

        let mut platform = FilePlatform::open(&path).unwrap();
        platform
            .set_property("ns", "Saved", Attributes::NON_VOLATILE, &[0xde, 0xad])
            .unwrap();
        platform
            .set_property("ns", "Lock", Attributes::BOOTSERVICE_ACCESS, &[1])
            .unwrap();
        drop(platform);

        let platform = FilePlatform::open(&path).unwrap();
        assert_eq!(
            platform.get_property("ns", "Saved").unwrap().value,
            vec![0xde, 0xad]
        );
        assert_eq!(platform.properties().count(), 2);
    }

    #[test]
    fn test_reset_persists_and_drops_volatile() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("platform.json");

        let mut platform = FilePlatform::open(&path).unwrap();
        platform
            .set_property("ns", "Saved", Attributes::NON_VOLATILE, &[1])
            .unwrap();
        platform
            .set_property("ns", "Lock", Attributes::NONE, &[1])
            .unwrap();
        platform.reset(ResetKind::Cold).unwrap();

        let platform = FilePlatform::open(&path).unwrap();
        assert!(platform.get_property("ns", "Saved").is_ok());
        assert_eq!(
            platform.get_property("ns", "Lock"),
            Err(PropertyError::NotFound)
        );
        assert_eq!(platform.resets(), &[ResetKind::Cold]);
    }

    #[test]
    fn test_platform_specific_reset_unsupported() {
        let tmp = TempDir::new().unwrap();
        let mut platform = FilePlatform::open(tmp.path().join("p.json")).unwrap();
        assert!(matches!(
            platform.reset(ResetKind::PlatformSpecific),
            Err(PlatformError::Unsupported(_))
        ));
    }
}
