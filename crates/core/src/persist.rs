//! Saved-state record and its durable store
//!
//! One fixed-layout record, overwritten in place, tells the next process
//! lifetime which test to re-enter and with what context:
//!
//! ```text
//! magic "RTSV" | version u16 | flags u16 (0x1 after cleanup, 0x2 from prerequisite)
//! framework fingerprint [32] | suite index u32 | test index u32
//! test fingerprint [32] | context length u32 | context bytes
//! checksum [32]   SHA-256 of everything above
//! ```
//!
//! All integers are little endian. The trailing checksum is the commit
//! marker: a torn write fails verification and reads back as corrupt, never
//! as a different valid resume point.

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::PersistenceError;
use crate::fingerprint::{Fingerprint, FINGERPRINT_SIZE};
use crate::platform::{Attributes, Platform, PropertyError};
use crate::{Error, Result};

pub const RECORD_MAGIC: [u8; 4] = *b"RTSV";
pub const RECORD_VERSION: u16 = 1;

/// Largest context a record may carry
pub const MAX_CONTEXT_SIZE: usize = 32 * 1024;

const FLAG_AFTER_CLEANUP: u16 = 0x0001;
const FLAG_FROM_PREREQUISITE: u16 = 0x0002;
const HEADER_SIZE: usize = 4 + 2 + 2 + FINGERPRINT_SIZE + 4 + 4 + FINGERPRINT_SIZE + 4;
const CHECKSUM_SIZE: usize = 32;

/// Where execution picks up after a relaunch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    /// Re-enter the saved test with the saved context.
    Reenter,
    /// The save came from the prerequisite, which has not passed yet.
    /// Re-enter the test and run the prerequisite again.
    ReenterPrerequisite,
    /// The saved test finished; continue with the one after it.
    AfterCleanup,
}

/// Decoded saved-state record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedState {
    pub framework: Fingerprint,
    pub suite_index: u32,
    pub test_index: u32,
    pub test: Fingerprint,
    pub mode: ResumeMode,
    #[serde(serialize_with = "serialize_context")]
    pub context: Vec<u8>,
}

fn serialize_context<S: serde::Serializer>(context: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(context))
}

impl SavedState {
    /// Serialize to the on-store layout
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.context.len() > MAX_CONTEXT_SIZE {
            return Err(Error::ContextTooLarge {
                size: self.context.len(),
                max: MAX_CONTEXT_SIZE,
            });
        }

        let flags = match self.mode {
            ResumeMode::Reenter => 0,
            ResumeMode::ReenterPrerequisite => FLAG_FROM_PREREQUISITE,
            ResumeMode::AfterCleanup => FLAG_AFTER_CLEANUP,
        };

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.context.len() + CHECKSUM_SIZE);
        buf.put_slice(&RECORD_MAGIC);
        buf.put_u16_le(RECORD_VERSION);
        buf.put_u16_le(flags);
        buf.put_slice(self.framework.as_bytes());
        buf.put_u32_le(self.suite_index);
        buf.put_u32_le(self.test_index);
        buf.put_slice(self.test.as_bytes());
        buf.put_u32_le(self.context.len() as u32);
        buf.put_slice(&self.context);

        let checksum = Sha256::digest(&buf);
        buf.put_slice(&checksum);
        Ok(buf.to_vec())
    }

    /// Parse and verify a stored record
    pub fn decode(data: &[u8]) -> std::result::Result<Self, PersistenceError> {
        let corrupt = |msg: &str| PersistenceError::Corrupt(msg.to_string());

        if data.len() < HEADER_SIZE + CHECKSUM_SIZE {
            return Err(corrupt("record truncated"));
        }

        let (body, checksum) = data.split_at(data.len() - CHECKSUM_SIZE);
        if Sha256::digest(body).as_slice() != checksum {
            return Err(corrupt("checksum mismatch"));
        }

        let mut buf = body;
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != RECORD_MAGIC {
            return Err(corrupt("bad magic"));
        }

        let version = buf.get_u16_le();
        if version != RECORD_VERSION {
            return Err(PersistenceError::Corrupt(format!(
                "unsupported record version {version}"
            )));
        }

        let flags = buf.get_u16_le();
        let mode = match flags {
            0 => ResumeMode::Reenter,
            FLAG_FROM_PREREQUISITE => ResumeMode::ReenterPrerequisite,
            FLAG_AFTER_CLEANUP => ResumeMode::AfterCleanup,
            _ => return Err(PersistenceError::Corrupt(format!("invalid flags {flags:#06x}"))),
        };

        let framework = read_fingerprint(&mut buf);
        let suite_index = buf.get_u32_le();
        let test_index = buf.get_u32_le();
        let test = read_fingerprint(&mut buf);
        let context_len = buf.get_u32_le() as usize;

        if context_len > MAX_CONTEXT_SIZE {
            return Err(corrupt("context length exceeds maximum"));
        }
        if buf.remaining() != context_len {
            return Err(PersistenceError::Corrupt(format!(
                "context length {} does not match {} remaining bytes",
                context_len,
                buf.remaining()
            )));
        }

        Ok(Self {
            framework,
            suite_index,
            test_index,
            test,
            mode,
            context: buf.to_vec(),
        })
    }
}

fn read_fingerprint(buf: &mut &[u8]) -> Fingerprint {
    let mut bytes = [0u8; FINGERPRINT_SIZE];
    buf.copy_to_slice(&mut bytes);
    Fingerprint::from_bytes(bytes)
}

/// Location of the saved-state record on a [`Platform`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateStore {
    namespace: String,
    name: String,
    max_context_size: usize,
}

impl StateStore {
    /// Record attributes: must survive a reset.
    pub const ATTRIBUTES: Attributes = Attributes::NON_VOLATILE.union(Attributes::BOOTSERVICE_ACCESS);

    /// Store for the framework with `short_title` under `namespace`
    pub fn new(namespace: &str, short_title: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: format!("{short_title}_SavedState"),
            max_context_size: MAX_CONTEXT_SIZE,
        }
    }

    /// Lower the context limit (never above [`MAX_CONTEXT_SIZE`])
    pub fn with_max_context_size(mut self, max: usize) -> Self {
        self.max_context_size = max.min(MAX_CONTEXT_SIZE);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_context_size(&self) -> usize {
        self.max_context_size
    }

    /// Read the record, if any.
    ///
    /// `Ok(None)` means nothing is stored; a stored but undecodable record is
    /// `Err(Corrupt)`.
    pub fn load(&self, platform: &dyn Platform) -> std::result::Result<Option<SavedState>, PersistenceError> {
        let property = match platform.get_property(&self.namespace, &self.name) {
            Ok(property) => property,
            Err(PropertyError::NotFound) => return Ok(None),
            Err(e) => return Err(PersistenceError::Read(e)),
        };

        SavedState::decode(&property.value).map(Some)
    }

    /// Overwrite the record. On failure the previous record is untouched.
    pub fn save(&self, platform: &mut dyn Platform, state: &SavedState) -> Result<()> {
        if state.context.len() > self.max_context_size {
            return Err(Error::ContextTooLarge {
                size: state.context.len(),
                max: self.max_context_size,
            });
        }

        let data = state.encode()?;
        platform
            .set_property(&self.namespace, &self.name, Self::ATTRIBUTES, &data)
            .map_err(PersistenceError::Write)?;

        debug!(
            "Saved state for test {} ({} context bytes, {:?})",
            state.test.short(),
            state.context.len(),
            state.mode
        );
        Ok(())
    }

    /// Delete the record. Clearing an absent record succeeds.
    pub fn clear(&self, platform: &mut dyn Platform) -> std::result::Result<(), PersistenceError> {
        match platform.set_property(&self.namespace, &self.name, Self::ATTRIBUTES, &[]) {
            Ok(()) | Err(PropertyError::NotFound) => Ok(()),
            Err(e) => Err(PersistenceError::Clear(e)),
        }
    }

    /// Clear, logging instead of failing
    pub(crate) fn clear_best_effort(&self, platform: &mut dyn Platform) {
        if let Err(e) = self.clear(platform) {
            warn!("Could not clear saved state {}/{}: {}", self.namespace, self.name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryPlatform;

    fn sample(context: Vec<u8>) -> SavedState {
        let framework = Fingerprint::of_framework("App", "1");
        let suite = Fingerprint::of_suite(&framework, "Suite");
        SavedState {
            framework,
            suite_index: 2,
            test_index: 7,
            test: Fingerprint::of_test(&suite, "Test"),
            mode: ResumeMode::Reenter,
            context,
        }
    }

    #[test]
    fn test_round_trip_preserves_context() {
        for context in [vec![], vec![1u8], (0..=255u8).collect::<Vec<_>>(), vec![0xa5; MAX_CONTEXT_SIZE]] {
            let state = sample(context);
            let decoded = SavedState::decode(&state.encode().unwrap()).unwrap();
            assert_eq!(decoded, state);
        }
    }

    #[test]
    fn test_resume_mode_flags() {
        for mode in [ResumeMode::Reenter, ResumeMode::ReenterPrerequisite, ResumeMode::AfterCleanup] {
            let mut state = sample(vec![]);
            state.mode = mode;
            let decoded = SavedState::decode(&state.encode().unwrap()).unwrap();
            assert_eq!(decoded.mode, mode);
        }
    }

    #[test]
    fn test_conflicting_flags_are_corrupt() {
        let mut data = sample(vec![]).encode().unwrap();
        data[6..8].copy_from_slice(&(FLAG_AFTER_CLEANUP | FLAG_FROM_PREREQUISITE).to_le_bytes());

        // Re-seal so only the flags are wrong.
        let body_len = data.len() - CHECKSUM_SIZE;
        let checksum = Sha256::digest(&data[..body_len]);
        data[body_len..].copy_from_slice(&checksum);

        assert!(matches!(
            SavedState::decode(&data),
            Err(PersistenceError::Corrupt(_))
        ));
    }

    #[test]
    fn test_oversized_context_rejected() {
        let state = sample(vec![0; MAX_CONTEXT_SIZE + 1]);
        assert!(matches!(state.encode(), Err(Error::ContextTooLarge { .. })));
    }

    #[test]
    fn test_torn_write_is_corrupt() {
        let data = sample(vec![1, 2, 3, 4]).encode().unwrap();

        // Every strict prefix must be rejected.
        for len in 0..data.len() {
            assert!(SavedState::decode(&data[..len]).is_err(), "prefix {len} decoded");
        }

        let mut flipped = data.clone();
        flipped[HEADER_SIZE - 10] ^= 0x01;
        assert!(matches!(
            SavedState::decode(&flipped),
            Err(PersistenceError::Corrupt(_))
        ));
    }

    #[test]
    fn test_store_save_load_clear() {
        let mut platform = MemoryPlatform::new();
        let store = StateStore::new("resumetest", "App");
        assert_eq!(store.load(&platform).unwrap(), None);

        let state = sample(b"{\"post_reset\":true}".to_vec());
        store.save(&mut platform, &state).unwrap();

        let property = platform.get_property("resumetest", "App_SavedState").unwrap();
        assert!(property.attributes.contains(Attributes::NON_VOLATILE));
        assert_eq!(store.load(&platform).unwrap(), Some(state));

        store.clear(&mut platform).unwrap();
        assert_eq!(store.load(&platform).unwrap(), None);
        // Clearing twice is fine.
        store.clear(&mut platform).unwrap();
    }

    #[test]
    fn test_failed_write_keeps_previous_record() {
        let mut platform = MemoryPlatform::new();
        let store = StateStore::new("resumetest", "App");
        let first = sample(vec![1]);
        store.save(&mut platform, &first).unwrap();

        platform.fail_writes(Some(PropertyError::Device("nv full".into())));
        let err = store.save(&mut platform, &sample(vec![2])).unwrap_err();
        assert!(matches!(err, Error::Persistence(PersistenceError::Write(_))));

        assert_eq!(store.load(&platform).unwrap(), Some(first));
    }

    #[test]
    fn test_store_context_limit() {
        let mut platform = MemoryPlatform::new();
        let store = StateStore::new("resumetest", "App").with_max_context_size(4);
        assert!(matches!(
            store.save(&mut platform, &sample(vec![0; 5])),
            Err(Error::ContextTooLarge { size: 5, max: 4 })
        ));
        assert!(!platform.contains("resumetest", "App_SavedState"));
    }
}
