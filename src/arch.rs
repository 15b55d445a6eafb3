//! Maps the host process architecture onto a native payload tag.

use std::fmt;

use crate::error::{Result, ScoreError};

/// Logical platform identifier selecting one embedded native payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformTag {
    X86,
    X64,
    Arm64,
}

impl PlatformTag {
    pub const ALL: [PlatformTag; 3] = [PlatformTag::X86, PlatformTag::X64, PlatformTag::Arm64];

    /// The tag as it appears in payload identifiers.
    pub fn as_str(self) -> &'static str {
        match self {
            PlatformTag::X86 => "x86",
            PlatformTag::X64 => "x64",
            PlatformTag::Arm64 => "arm64",
        }
    }

    /// Map an architecture name to its tag.
    ///
    /// Accepts Rust target names (`x86_64`, `aarch64`) as well as the
    /// logical names themselves. Anything else, 32-bit ARM and wasm
    /// included, is unsupported.
    pub fn from_arch(arch: &str) -> Result<Self> {
        match arch {
            "x86" => Ok(PlatformTag::X86),
            "x86_64" | "x64" => Ok(PlatformTag::X64),
            "aarch64" | "arm64" => Ok(PlatformTag::Arm64),
            other => Err(ScoreError::UnsupportedArchitecture(other.to_string())),
        }
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Architecture of the running process.
pub fn host_arch() -> &'static str {
    std::env::consts::ARCH
}

/// Resolve the tag for the running process.
pub fn resolve() -> Result<PlatformTag> {
    PlatformTag::from_arch(host_arch())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_architectures_map_to_one_tag() {
        assert_eq!(PlatformTag::from_arch("x86").unwrap(), PlatformTag::X86);
        assert_eq!(PlatformTag::from_arch("x86_64").unwrap(), PlatformTag::X64);
        assert_eq!(PlatformTag::from_arch("aarch64").unwrap(), PlatformTag::Arm64);
        assert_eq!(PlatformTag::from_arch("arm64").unwrap(), PlatformTag::Arm64);
        for tag in PlatformTag::ALL {
            assert_eq!(PlatformTag::from_arch(tag.as_str()).unwrap(), tag);
        }
    }

    #[test]
    fn unsupported_architecture_names_the_value() {
        for arch in ["arm", "wasm32", "s390x", "riscv64", ""] {
            let err = PlatformTag::from_arch(arch).unwrap_err();
            assert_eq!(err, ScoreError::UnsupportedArchitecture(arch.to_string()));
            assert!(err.to_string().ends_with(arch));
        }
    }

    #[test]
    fn resolve_agrees_with_host() {
        match host_arch() {
            "x86" | "x86_64" | "aarch64" => assert!(resolve().is_ok()),
            _ => assert!(resolve().is_err()),
        }
    }
}
