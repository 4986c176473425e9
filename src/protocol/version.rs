//! Protocol version and compatibility rule.
//!
//! Two versions are compatible when their major components match and,
//! on `0.x` lines, their minor components match too.

// ============================================================================
// Imports
// ============================================================================

use semver::Version;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default protocol version announced in handshakes.
///
/// Endpoints may override it with `BridgeBuilder::version`.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Compatibility
// ============================================================================

/// Parses a semantic version string.
///
/// # Errors
///
/// Returns [`Error::InvalidVersion`] if `version` is not valid semver.
pub fn parse_version(version: &str) -> Result<Version> {
    Version::parse(version).map_err(|_| Error::invalid_version(version))
}

/// Returns `true` if two parsed versions can talk to each other.
#[must_use]
pub fn is_compatible(a: &Version, b: &Version) -> bool {
    if a.major != b.major {
        return false;
    }
    a.major >= 1 || a.minor == b.minor
}

/// Checks a peer's announced version against the local one.
///
/// # Errors
///
/// - [`Error::InvalidVersion`] if either string is not valid semver
/// - [`Error::IncompatibleVersion`] if the versions are incompatible
pub fn check_compatible(local: &str, remote: &str) -> Result<()> {
    let local_version = parse_version(local)?;
    let remote_version = parse_version(remote)?;

    if is_compatible(&local_version, &remote_version) {
        Ok(())
    } else {
        Err(Error::incompatible_version(local, remote))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_same_major_compatible() {
        assert!(check_compatible("1.2.0", "1.9.9").is_ok());
    }

    #[test]
    fn test_different_major_incompatible() {
        let err = check_compatible("1.0.0", "2.0.0").unwrap_err();
        assert!(matches!(err, Error::IncompatibleVersion { .. }));
    }

    #[test]
    fn test_zero_major_requires_minor_match() {
        assert!(check_compatible("0.3.0", "0.4.0").is_err());
        assert!(check_compatible("0.3.1", "0.3.9").is_ok());
    }

    #[test]
    fn test_invalid_version() {
        let err = check_compatible("1.0.0", "latest").unwrap_err();
        assert!(matches!(err, Error::InvalidVersion { .. }));
    }

    #[test]
    fn test_default_version_parses() {
        assert!(parse_version(PROTOCOL_VERSION).is_ok());
    }

    proptest! {
        #[test]
        fn compatibility_is_symmetric(
            a in (0u64..4, 0u64..4, 0u64..4),
            b in (0u64..4, 0u64..4, 0u64..4),
        ) {
            let va = Version::new(a.0, a.1, a.2);
            let vb = Version::new(b.0, b.1, b.2);
            prop_assert_eq!(is_compatible(&va, &vb), is_compatible(&vb, &va));
        }

        #[test]
        fn patch_never_matters(major in 0u64..4, minor in 0u64..4, p1 in 0u64..50, p2 in 0u64..50) {
            let va = Version::new(major, minor, p1);
            let vb = Version::new(major, minor, p2);
            prop_assert!(is_compatible(&va, &vb));
        }
    }
}
