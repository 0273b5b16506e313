//! Semver parsing helpers shared by `Artifact` and `Index`.
//!
//! Unlike the teacher's permissive `Version` newtype (which falls back to a
//! string comparison when a version fails to parse), every version string
//! here must parse as strict semver: both the artifact and index invariants
//! in the data model require it, so a fallback would hide a malformed index
//! behind a "works most of the time" comparison.

use semver::Version;

/// Error returned when a version string is not valid semver.
#[derive(Debug, thiserror::Error)]
#[error("invalid semver '{raw}': {source}")]
pub struct VersionError {
    raw: String,
    #[source]
    source: semver::Error,
}

/// Parse a version string, producing a [`VersionError`] that retains the
/// offending input for error messages further up the stack.
///
/// # Errors
///
/// Returns [`VersionError`] if `raw` is not valid semver.
pub fn parse(raw: &str) -> Result<Version, VersionError> {
    Version::parse(raw).map_err(|source| VersionError {
        raw: raw.to_string(),
        source,
    })
}

/// `a` is strictly newer than `b`.
pub fn is_newer(a: &Version, b: &Version) -> bool {
    a > b
}

/// The zero-version sentinel used by [`crate::Index::bootstrap`].
pub fn zero() -> Version {
    Version::new(0, 0, 0)
}
