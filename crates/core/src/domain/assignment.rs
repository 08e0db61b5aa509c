// Assignment Domain Model

use std::fmt;
use std::path::{Path, PathBuf};

/// Target address token as sent by the server (opaque, not validated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetAddress(String);

impl TargetAddress {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One cycle's work assignment
///
/// Created fresh on every successful receive and handed by value to the
/// supervision phase. Only the image file outlives the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub target: TargetAddress,
    pub image_path: PathBuf,
    /// Number of image bytes written for this cycle
    pub image_bytes: u64,
}

impl Assignment {
    pub fn new(target: TargetAddress, image_path: impl Into<PathBuf>, image_bytes: u64) -> Self {
        Self {
            target,
            image_path: image_path.into(),
            image_bytes,
        }
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }
}
