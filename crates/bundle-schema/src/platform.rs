//! Platform string type: `<os>_<arch>`, empty meaning cross-platform.

use std::fmt;

/// A platform tag as it appears in the index (`linux_amd64`,
/// `windows_arm64`, ...) or the empty string for an artifact shared across
/// all platforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, Default)]
#[serde(transparent)]
pub struct Platform(String);

impl Platform {
    /// Cross-platform sentinel (empty tag).
    pub fn cross_platform() -> Self {
        Self(String::new())
    }

    /// Build a platform tag from explicit os/arch components.
    pub fn new(os: &str, arch: &str) -> Self {
        Self(format!("{os}_{arch}"))
    }

    /// Wrap a raw tag as read from an index, verbatim.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The platform of the host this code is compiled for.
    pub fn current() -> Self {
        Self::new(os_name(), arch_name())
    }

    /// True for the empty tag.
    pub fn is_cross_platform(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the raw tag string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn os_name() -> &'static str {
    if cfg!(target_os = "linux") {
        "linux"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "darwin"
    } else {
        "unknown"
    }
}

fn arch_name() -> &'static str {
    if cfg!(target_arch = "x86_64") {
        "amd64"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_platform_is_empty() {
        assert!(Platform::cross_platform().is_cross_platform());
        assert_eq!(Platform::cross_platform().as_str(), "");
    }

    #[test]
    fn composed_tag_matches_convention() {
        assert_eq!(Platform::new("linux", "amd64").as_str(), "linux_amd64");
    }

    #[test]
    fn current_is_not_cross_platform() {
        assert!(!Platform::current().is_cross_platform());
    }
}
