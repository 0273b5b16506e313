//! The bundle index: parse, verify, and compare.

use crate::artifact::{Artifact, ArtifactError};
use crate::platform::Platform;
use crate::signature::{SignatureError, TrustStore};
use crate::version::{self, VersionError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Errors raised while loading or comparing an index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A trust store was configured and the detached signature did not
    /// verify.
    #[error("index signature is invalid: {0}")]
    SignatureInvalid(#[from] SignatureError),
    /// The JSON body did not parse, or failed a post-parse invariant
    /// (duplicate `(filename, platform)` pair, unparseable version).
    #[error("index is malformed: {0}")]
    Malformed(String),
    /// `published` is further in the future than the configured tolerance.
    #[error("index published {published} is more than {tolerance_secs}s in the future")]
    FromFuture {
        /// The offending publication timestamp.
        published: DateTime<Utc>,
        /// The configured tolerance, in seconds.
        tolerance_secs: i64,
    },
}

impl From<VersionError> for IndexError {
    fn from(e: VersionError) -> Self {
        Self::Malformed(e.to_string())
    }
}

impl From<ArtifactError> for IndexError {
    fn from(e: ArtifactError) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// The three outcomes of comparing a currently-active index against a
/// candidate, per the upgrade-eligibility table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// `candidate` should replace `current`.
    Upgrade,
    /// Same name, version, and publication time: nothing to do.
    SameIndex,
    /// Any other case: name mismatch, candidate not newer, or either index
    /// not self-consistent.
    NoUpdateAvailable,
}

/// An ordered collection of artifacts plus bundle-level metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Published")]
    pub published: DateTime<Utc>,
    #[serde(rename = "Artifacts")]
    pub artifacts: Vec<Artifact>,

    #[serde(skip)]
    verified: bool,
}

impl Index {
    /// The zero-version bootstrap sentinel: the implicit "current index"
    /// before any bundle has ever been installed.
    pub fn bootstrap() -> Self {
        Self {
            name: String::new(),
            version: version::zero().to_string(),
            published: DateTime::from_timestamp(0, 0).unwrap_or_default(),
            artifacts: Vec::new(),
            verified: true,
        }
    }

    /// True if this is the [`Index::bootstrap`] sentinel.
    pub fn is_bootstrap(&self) -> bool {
        self.name.is_empty() && self.version == version::zero().to_string()
    }

    /// Whether the index was signature-verified at load time.
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Parse an index from raw bytes, optionally checking a detached
    /// signature first, then applying the platform filter and the
    /// post-parse invariants (parseable version, no duplicate
    /// `(filename, platform)` pairs, publication not too far in the
    /// future).
    ///
    /// `signature_b64`, when a `trust_store` is supplied, must be the
    /// detached Ed25519 signature over `bytes` exactly as received (before
    /// any JSON parsing).
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::SignatureInvalid`], [`IndexError::Malformed`],
    /// or [`IndexError::FromFuture`].
    pub fn parse(
        bytes: &[u8],
        trust_store: Option<(&TrustStore, &str)>,
        platform: &Platform,
        future_tolerance_secs: i64,
    ) -> Result<Self, IndexError> {
        let verified = if let Some((store, signature_b64)) = trust_store {
            store.verify(bytes, signature_b64)?;
            true
        } else {
            false
        };

        let mut index: Self =
            serde_json::from_slice(bytes).map_err(|e| IndexError::Malformed(e.to_string()))?;
        index.verified = verified;

        index.artifacts.retain(|a| a.applies_to(platform));
        index.finalize(future_tolerance_secs)?;
        Ok(index)
    }

    /// Re-run the post-parse invariants and derived-field computation. Used
    /// by [`Index::parse`] and by callers that construct an `Index`
    /// in-process (tests, the bootstrap sentinel's caller).
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Malformed`] for a duplicate `(filename,
    /// platform)` pair, an unparseable version, or an invalid artifact, and
    /// [`IndexError::FromFuture`] if `published` is too far ahead.
    pub fn finalize(&mut self, future_tolerance_secs: i64) -> Result<(), IndexError> {
        let now = Utc::now();
        let max_future = now + chrono::Duration::seconds(future_tolerance_secs);
        if self.published > max_future {
            return Err(IndexError::FromFuture {
                published: self.published,
                tolerance_secs: future_tolerance_secs,
            });
        }

        let bundle_version = version::parse(&self.version)?;

        let mut seen = HashSet::new();
        for artifact in &mut self.artifacts {
            artifact.validate()?;
            let key = (artifact.filename.clone(), artifact.platform.clone());
            if !seen.insert(key) {
                return Err(IndexError::Malformed(format!(
                    "duplicate artifact '{}' for platform '{}'",
                    artifact.filename, artifact.platform
                )));
            }
        }
        self.artifacts
            .sort_by(|a, b| a.filename.cmp(&b.filename));

        let owner_dir = std::path::Path::new(".");
        for artifact in &mut self.artifacts {
            artifact.finalize(owner_dir, &bundle_version);
        }
        Ok(())
    }

    /// Recompute derived artifact paths against a real owning directory
    /// (the active or staging directory), after [`Index::parse`] has
    /// already finalized versions against a placeholder path.
    pub fn rebase(&mut self, owner_dir: &std::path::Path) {
        let bundle_version =
            version::parse(&self.version).unwrap_or_else(|_| version::zero());
        for artifact in &mut self.artifacts {
            artifact.finalize(owner_dir, &bundle_version);
        }
    }

    /// Serialize back to the wire JSON format.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails (it should
    /// not, for a successfully-parsed index).
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Look up a single artifact by logical filename.
    pub fn artifact(&self, filename: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.filename == filename)
    }

    /// Compare a currently-active index against a candidate, per the
    /// upgrade-eligibility table in the component design.
    pub fn should_upgrade_to(current: &Self, candidate: &Self) -> UpgradeOutcome {
        if current.is_bootstrap() {
            return UpgradeOutcome::Upgrade;
        }
        if current.name != candidate.name {
            return UpgradeOutcome::NoUpdateAvailable;
        }
        let (Ok(cur_ver), Ok(cand_ver)) = (
            version::parse(&current.version),
            version::parse(&candidate.version),
        ) else {
            return UpgradeOutcome::NoUpdateAvailable;
        };
        if cand_ver == cur_ver && candidate.published == current.published {
            return UpgradeOutcome::SameIndex;
        }
        if version::is_newer(&cand_ver, &cur_ver) && candidate.published > current.published {
            return UpgradeOutcome::Upgrade;
        }
        UpgradeOutcome::NoUpdateAvailable
    }
}
