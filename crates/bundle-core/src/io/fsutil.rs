//! Move-with-fallback and directory integrity checks shared by the
//! downloader's reuse probe, the swap protocol, and rollback.
//!
//! Grounded in the teacher's atomic-write idiom (`manifest.rs::save`:
//! write to a temp path, then rename) and its binary self-replace step
//! (`cmd::self_update.rs`: copy to a `.new` sibling, then rename over the
//! live path) — generalized here into one primitive used by both
//! directions of the swap.

use bundle_schema::Sha256Hex;
use std::path::Path;

/// Move `from` to `to`, preserving the file name, attempting a rename
/// first and falling back to copy-verify-delete on failure (e.g.
/// cross-device `EXDEV`).
///
/// `expected_sha256`, when present, is checked against the copied bytes
/// before the source is deleted; an empty-string SHA (as modeled by
/// `None` here) disables the content check, used for incidental
/// non-artifact files such as a stale index.
///
/// # Errors
///
/// Returns an I/O error if neither the rename nor the copy-fallback
/// succeeds, or if the copied file's hash does not match
/// `expected_sha256`.
pub async fn move_with_fallback(
    from: &Path,
    to: &Path,
    expected_sha256: Option<&Sha256Hex>,
) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(from, to).await?;
            if let Some(expected) = expected_sha256 {
                let to_owned = to.to_path_buf();
                let actual = tokio::task::spawn_blocking(move || Sha256Hex::digest_file(&to_owned))
                    .await??;
                if &actual != expected {
                    tokio::fs::remove_file(to).await.ok();
                    return Err(std::io::Error::other(format!(
                        "copy-fallback hash mismatch: expected {expected}, got {actual}"
                    )));
                }
            }
            tokio::fs::remove_file(from).await?;
            Ok(())
        }
    }
}

/// Result of checking one artifact against the directory it should live
/// in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactCheck {
    /// File exists with the declared hash.
    Ok,
    /// File is missing.
    Missing,
    /// File exists but its content hash does not match.
    Mismatch {
        /// Digest actually found on disk.
        actual: Sha256Hex,
    },
}

/// Check one artifact's file against its declared digest inside `dir`.
pub fn check_artifact(dir: &Path, filename: &str, expected: &Sha256Hex) -> ArtifactCheck {
    let path = dir.join(filename);
    if !path.is_file() {
        return ArtifactCheck::Missing;
    }
    match Sha256Hex::digest_file(&path) {
        Ok(actual) if &actual == expected => ArtifactCheck::Ok,
        Ok(actual) => ArtifactCheck::Mismatch { actual },
        Err(_) => ArtifactCheck::Missing,
    }
}

/// Iterate every artifact in `index` and verify it exists at
/// `dir/filename` with the declared SHA-256. Returns the filename of the
/// first mismatch or missing file, if any.
pub fn verify_artifacts(dir: &Path, index: &bundle_schema::Index) -> Result<(), (String, ArtifactCheck)> {
    for artifact in &index.artifacts {
        match check_artifact(dir, &artifact.filename, &artifact.sha256) {
            ArtifactCheck::Ok => {}
            other => return Err((artifact.filename.clone(), other)),
        }
    }
    Ok(())
}
