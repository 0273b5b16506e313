//! The error taxonomy for the updater, mirroring the component design's
//! error-handling section one variant at a time.

use bundle_schema::IndexError;

/// All errors the updater's public operations can return.
#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    /// `GetFile`/`GetFiles` requested a logical name absent from the
    /// current index.
    #[error("file '{0}' not found in current index")]
    NotFound(String),

    /// A candidate index is identical to or older than the current one.
    #[error("no update available")]
    NoUpdateAvailable,

    /// Sentinel sub-case of [`UpdaterError::NoUpdateAvailable`]: same
    /// version and publication time.
    #[error("candidate index is identical to the current index")]
    SameIndex,

    /// Policy forbids auto-download or auto-apply and the caller must
    /// prompt the user (not raised when `notify` is on; a notification is
    /// emitted instead).
    #[error("user action required to continue the update")]
    ActionRequired,

    /// The index's detached signature did not verify, the JSON was
    /// malformed, or a post-parse invariant failed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Every URL for one artifact failed, or the index could not be
    /// fetched from any mirror.
    #[error("failed to download '{name}': {reason}")]
    ArtifactDownloadFailed {
        /// Logical filename or "index" for the index fetch itself.
        name: String,
        /// Human-readable cause (last error encountered).
        reason: String,
    },

    /// A downloaded artifact's content did not match its declared digest.
    #[error("hash mismatch for '{name}': expected {expected}, got {actual}")]
    ArtifactHashMismatch {
        /// Logical filename.
        name: String,
        /// Declared SHA-256.
        expected: String,
        /// Actual SHA-256 of the received bytes.
        actual: String,
    },

    /// Decompression of a downloaded artifact failed or exceeded the size
    /// cap.
    #[error("failed to decompress '{name}': {reason}")]
    ArtifactDecompressFailed {
        /// Logical filename.
        name: String,
        /// Human-readable cause.
        reason: String,
    },

    /// A zip artifact contained zero or more than one entry.
    #[error("artifact '{name}' zip archive must contain exactly one entry, found {count}")]
    ArtifactUnpackMultipleFiles {
        /// Logical filename.
        name: String,
        /// Number of entries actually found.
        count: usize,
    },

    /// The atomic directory swap failed. Rollback was attempted; its
    /// outcome is logged separately and never masks this error.
    #[error("swap failed: {0}")]
    SwapFailed(String),

    /// Startup integrity check failed against the active directory. Not
    /// raised as a function error in normal operation; the state machine
    /// publishes it as a persistent flag instead.
    #[error("active installation is corrupted: {0}")]
    CorruptedInstallation(String),

    /// A mutating operation was requested while another is already
    /// running.
    #[error("an update is already in progress")]
    AlreadyRunning,

    /// Plain I/O failure not otherwise classified above.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl UpdaterError {
    /// Whether this error should be surfaced to the end user as a failure
    /// notification, per the propagation rules: `SameIndex` and
    /// `NoUpdateAvailable` are not user-facing unless the caller forced an
    /// apply.
    pub fn is_user_facing_failure(&self) -> bool {
        !matches!(self, Self::SameIndex | Self::NoUpdateAvailable)
    }
}
