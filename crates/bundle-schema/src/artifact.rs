//! A single named file belonging to a bundle.

use crate::hash::Sha256Hex;
use crate::platform::Platform;
use crate::version::{self, VersionError};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The unpack codec an artifact's downloaded bytes must be run through
/// before the SHA-256 check is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnpackCodec {
    /// No decompression; bytes are used verbatim.
    #[default]
    #[serde(rename = "")]
    None,
    /// Single-stream gzip.
    Gz,
    /// Zip archive; must contain exactly one entry.
    Zip,
}

impl UnpackCodec {
    /// True for any codec other than [`UnpackCodec::None`].
    pub fn is_set(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Unix file mode an artifact should be written with in the active and
/// staging directories (see the permission table in the external
/// interfaces).
pub type FileMode = u32;

const MODE_EXECUTABLE: FileMode = 0o744;
const MODE_PORTMASTER_UI: FileMode = 0o755;
const MODE_DATA: FileMode = 0o644;

/// Error returned by [`Artifact::validate`].
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// `Filename` was empty.
    #[error("artifact filename is empty")]
    EmptyFilename,
    /// A declared URL did not use HTTPS.
    #[error("artifact url '{0}' is not https")]
    NonHttpsUrl(String),
    /// No URLs were declared.
    #[error("artifact '{0}' has no fetch urls")]
    NoUrls(String),
    /// `Unpack` was set but the filename still carries the codec suffix.
    #[error("artifact '{0}' declares unpack but filename carries a codec suffix")]
    SuffixNotStripped(String),
    /// The optional per-artifact version did not parse as semver.
    #[error("artifact '{0}' has an invalid version: {1}")]
    InvalidVersion(String, #[source] VersionError),
}

/// A file named in an index, as deserialized from the wire format.
///
/// `local_path` and `parsed_version` are derived on load; both are skipped
/// on serialization and recomputed by [`Artifact::finalize`] every time the
/// bytes are parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "SHA256")]
    pub sha256: Sha256Hex,
    #[serde(rename = "URLs")]
    pub urls: Vec<String>,
    #[serde(rename = "Platform", default)]
    pub platform: Platform,
    #[serde(rename = "Unpack", default)]
    pub unpack: UnpackCodec,
    #[serde(rename = "Version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip)]
    local_path: Option<PathBuf>,
    #[serde(skip)]
    parsed_version: Option<Version>,
}

impl Artifact {
    /// Validate the per-field invariants from the data model: non-empty
    /// filename, HTTPS-only URLs, codec-suffix consistency, parseable
    /// optional version, well-formed hash (already enforced by
    /// [`Sha256Hex`]'s `Deserialize`, re-checked here for artifacts built
    /// in-process).
    ///
    /// # Errors
    ///
    /// Returns the first [`ArtifactError`] encountered.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.filename.is_empty() {
            return Err(ArtifactError::EmptyFilename);
        }
        if self.urls.is_empty() {
            return Err(ArtifactError::NoUrls(self.filename.clone()));
        }
        for url in &self.urls {
            if !url.starts_with("https://") {
                return Err(ArtifactError::NonHttpsUrl(url.clone()));
            }
        }
        if self.unpack.is_set() {
            let suffix = match self.unpack {
                UnpackCodec::Gz => ".gz",
                UnpackCodec::Zip => ".zip",
                UnpackCodec::None => unreachable!(),
            };
            if self.filename.ends_with(suffix) {
                return Err(ArtifactError::SuffixNotStripped(self.filename.clone()));
            }
        }
        if let Some(v) = &self.version {
            version::parse(v)
                .map_err(|e| ArtifactError::InvalidVersion(self.filename.clone(), e))?;
        }
        Ok(())
    }

    /// Recompute the derived fields (local path, parsed version) after
    /// parsing or constructing an artifact. `bundle_version` is used when
    /// the artifact carries no explicit version of its own.
    pub fn finalize(&mut self, owner_dir: &Path, bundle_version: &Version) {
        self.local_path = Some(owner_dir.join(&self.filename));
        self.parsed_version = Some(match &self.version {
            Some(v) => version::parse(v).unwrap_or_else(|_| bundle_version.clone()),
            None => bundle_version.clone(),
        });
    }

    /// Absolute path under the owning directory. Panics if called before
    /// [`Artifact::finalize`]; every artifact reachable through
    /// [`crate::Index`] has already been finalized at load time.
    pub fn local_path(&self) -> &Path {
        self.local_path
            .as_deref()
            .expect("artifact not finalized: local_path requested before Index::finalize")
    }

    /// The artifact's effective semver: its own if present, else the
    /// bundle's.
    pub fn parsed_version(&self) -> &Version {
        self.parsed_version
            .as_ref()
            .expect("artifact not finalized: parsed_version requested before Index::finalize")
    }

    /// Whether this artifact applies to `platform`: either it is
    /// cross-platform (empty tag) or its tag matches exactly.
    pub fn applies_to(&self, platform: &Platform) -> bool {
        self.platform.is_cross_platform() || &self.platform == platform
    }

    /// Unix mode this artifact should be written with, per the permission
    /// table: platform-specific binaries are `0744`, the `portmaster` UI
    /// binary on Linux is `0755`, everything else is `0644`.
    pub fn mode(&self) -> FileMode {
        if self.filename == "portmaster" && self.platform.as_str().starts_with("linux_") {
            MODE_PORTMASTER_UI
        } else if !self.platform.is_cross_platform() {
            MODE_EXECUTABLE
        } else {
            MODE_DATA
        }
    }
}
