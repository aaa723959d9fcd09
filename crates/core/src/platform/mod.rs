//! Platform collaborator: non-volatile properties and the reset primitive
//!
//! The engine never talks to firmware directly. Everything it needs from the
//! machine under test, including the durable store for its own saved state,
//! goes through [`Platform`].

pub mod file;
pub mod memory;

pub use file::FilePlatform;
pub use memory::MemoryPlatform;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Property attribute bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(u32);

impl Attributes {
    pub const NONE: Attributes = Attributes(0);
    /// Survives a reset.
    pub const NON_VOLATILE: Attributes = Attributes(0x0000_0001);
    pub const BOOTSERVICE_ACCESS: Attributes = Attributes(0x0000_0002);
    pub const RUNTIME_ACCESS: Attributes = Attributes(0x0000_0004);
    pub const TIME_BASED_AUTHENTICATED_WRITE_ACCESS: Attributes = Attributes(0x0000_0020);

    pub const fn from_bits(bits: u32) -> Self {
        Attributes(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: Attributes) -> Self {
        Attributes(self.0 | other.0)
    }

    pub const fn contains(self, other: Attributes) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Attributes {
    type Output = Attributes;

    fn bitor(self, rhs: Attributes) -> Attributes {
        self.union(rhs)
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// A property value as read back from the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub attributes: Attributes,
    pub value: Vec<u8>,
}

impl Property {
    pub fn size(&self) -> usize {
        self.value.len()
    }
}

/// Reset classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetKind {
    Cold,
    Warm,
    Shutdown,
    PlatformSpecific,
}

impl fmt::Display for ResetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetKind::Cold => write!(f, "cold"),
            ResetKind::Warm => write!(f, "warm"),
            ResetKind::Shutdown => write!(f, "shutdown"),
            ResetKind::PlatformSpecific => write!(f, "platform-specific"),
        }
    }
}

/// Property access failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    #[error("property not found")]
    NotFound,

    #[error("access denied")]
    AccessDenied,

    #[error("invalid parameter")]
    InvalidParameter,

    #[error("bad buffer size")]
    BadBufferSize,

    #[error("device error: {0}")]
    Device(String),
}

/// Reset primitive failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("reset kind not supported: {0}")]
    Unsupported(String),

    #[error("reset refused: {0}")]
    Refused(String),
}

/// The machine under test
pub trait Platform {
    /// Read a property
    fn get_property(&self, namespace: &str, name: &str) -> Result<Property, PropertyError>;

    /// Write a property. An empty `value` deletes it.
    fn set_property(
        &mut self,
        namespace: &str,
        name: &str,
        attributes: Attributes,
        value: &[u8],
    ) -> Result<(), PropertyError>;

    /// Whether [`Platform::reset`] would accept `kind`
    fn supports_reset(&self, kind: ResetKind) -> bool {
        let _ = kind;
        true
    }

    /// Reset the machine.
    ///
    /// On real hardware this does not return on success. Simulated platforms
    /// return `Ok(())` and the host is expected to end the process.
    fn reset(&mut self, kind: ResetKind) -> Result<(), PlatformError>;
}
