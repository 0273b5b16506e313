//! Atomically replaces the active directory's contents with the staging
//! directory's contents, with crash-safe rollback via the purge-hold
//! directory.
//!
//! Grounded in the teacher's atomic rename-then-copy-fallback idiom
//! (`manifest.rs::Lockfile::save`, `cmd::self_update.rs`'s `.new`-sibling
//! replace), generalized into the shared [`crate::io::fsutil::move_with_fallback`]
//! primitive used by both the purge step and rollback.

use crate::config::UpdaterConfig;
use crate::error::UpdaterError;
use crate::io::download::CancelSignal;
use crate::io::fsutil::move_with_fallback;
use bundle_schema::Index;
use std::path::Path;

/// Recreate the purge-hold directory, empty, ready to receive the active
/// directory's current contents.
async fn recreate_purge_hold(purge_hold_dir: &Path) -> std::io::Result<()> {
    if purge_hold_dir.exists() {
        tokio::fs::remove_dir_all(purge_hold_dir).await?;
    }
    tokio::fs::create_dir_all(purge_hold_dir).await
}

/// Execute the four-step swap protocol. On failure, rolls back everything
/// moved into the purge-hold directory and returns the original error
/// (rollback's own outcome is logged, never substituted for it).
///
/// # Errors
///
/// Returns [`UpdaterError::SwapFailed`] if any step fails. The active
/// directory is guaranteed, after this call returns (success or failure),
/// to pass [`crate::io::fsutil::verify_artifacts`] against either the new
/// index (on success) or the previously-active index (on failure, via
/// rollback).
pub async fn swap(
    config: &UpdaterConfig,
    new_index: &Index,
    cancel: &CancelSignal,
) -> Result<(), UpdaterError> {
    recreate_purge_hold(&config.purge_hold_dir)
        .await
        .map_err(|e| UpdaterError::SwapFailed(e.to_string()))?;

    if let Err(e) = run_swap_steps(config, new_index, cancel).await {
        tracing::warn!(error = %e, "swap failed, rolling back");
        rollback(config).await;
        return Err(UpdaterError::SwapFailed(e));
    }

    tokio::fs::remove_dir_all(&config.purge_hold_dir).await.ok();
    tokio::fs::remove_dir_all(&config.staging_dir).await.ok();
    tracing::info!(bundle = %config.bundle_name, version = %new_index.version, "swap succeeded");
    Ok(())
}

async fn run_swap_steps(
    config: &UpdaterConfig,
    new_index: &Index,
    cancel: &CancelSignal,
) -> Result<(), String> {
    if cancel.is_cancelled() {
        return Err("cancelled before step 1".to_string());
    }

    // Step 1: move everything in active (not ignored) into purge-hold.
    let mut entries = tokio::fs::read_dir(&config.active_dir)
        .await
        .map_err(|e| e.to_string())?;
    while let Some(entry) = entries.next_entry().await.map_err(|e| e.to_string())? {
        let name = entry.file_name();
        let name_str = name.to_string_lossy().to_string();
        if config.is_ignored(&name_str) {
            continue;
        }
        let from = entry.path();
        let to = config.purge_hold_dir.join(&name);
        // Empty-string SHA disables the content check for incidental
        // non-artifact files (notably the old index, not named by the new
        // index's artifact list).
        move_with_fallback(&from, &to, None)
            .await
            .map_err(|e| e.to_string())?;
    }
    if cancel.is_cancelled() {
        return Err("cancelled between step 1 and step 2".to_string());
    }

    // Step 2: move the new index from staging into active.
    let staged_index_path = config.staging_dir.join(&config.index_filename);
    let active_index_path = config.active_dir.join(&config.index_filename);
    move_with_fallback(&staged_index_path, &active_index_path, None)
        .await
        .map_err(|e| e.to_string())?;
    if cancel.is_cancelled() {
        return Err("cancelled between step 2 and step 3".to_string());
    }

    // Step 3: move each artifact from staging into active, sorted.
    for artifact in &new_index.artifacts {
        let from = config.staging_dir.join(&artifact.filename);
        let to = config.active_dir.join(&artifact.filename);
        move_with_fallback(&from, &to, Some(&artifact.sha256))
            .await
            .map_err(|e| e.to_string())?;
        set_mode(&to, artifact.mode()).await.map_err(|e| e.to_string())?;
        if cancel.is_cancelled() {
            return Err("cancelled during step 3".to_string());
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Move every entry in the purge-hold directory back to active, best
/// effort: a failure on one file does not stop the others from being
/// restored.
async fn rollback(config: &UpdaterConfig) {
    let mut entries = match tokio::fs::read_dir(&config.purge_hold_dir).await {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(error = %e, "rollback: could not read purge-hold directory");
            return;
        }
    };
    loop {
        let next = entries.next_entry().await;
        let entry = match next {
            Ok(Some(e)) => e,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "rollback: error iterating purge-hold directory");
                break;
            }
        };
        let name = entry.file_name();
        let from = entry.path();
        let to = config.active_dir.join(&name);
        if let Err(e) = move_with_fallback(&from, &to, None).await {
            tracing::warn!(file = ?name, error = %e, "rollback: failed to restore file");
        }
    }
}
