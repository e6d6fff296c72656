//! IL structure versioning

use std::fmt;

use serde::{Deserialize, Serialize};

/// `OMX_VERSIONTYPE`, stamped into every buffer header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
    pub step: u8,
}

impl SpecVersion {
    /// Version implemented by this component (1.1)
    pub const COMPONENT: SpecVersion = SpecVersion::new(1, 1, 0, 0);

    pub const fn new(major: u8, minor: u8, revision: u8, step: u8) -> Self {
        Self {
            major,
            minor,
            revision,
            step,
        }
    }

    /// Packed little-endian form (`nVersion`)
    pub fn as_u32(self) -> u32 {
        u32::from_le_bytes([self.major, self.minor, self.revision, self.step])
    }

    pub fn from_u32(raw: u32) -> Self {
        let [major, minor, revision, step] = raw.to_le_bytes();
        Self::new(major, minor, revision, step)
    }
}

impl Default for SpecVersion {
    fn default() -> Self {
        SpecVersion::COMPONENT
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.revision, self.step
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_layout() {
        let v = SpecVersion::COMPONENT;
        assert_eq!(v.as_u32(), 0x0000_0101);
        assert_eq!(SpecVersion::from_u32(0x0000_0101), v);
        assert_eq!(v.to_string(), "1.1.0.0");
    }
}
