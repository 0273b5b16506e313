//! Brings the staging directory into the state "contains the new index and
//! every artifact it names, each byte-identical to its declared digest."
//!
//! Grounded in the teacher's `io::download.rs` streaming-SHA256 pattern,
//! trimmed of its manifest-chunking/parallel-range-GET machinery (this
//! crate downloads one artifact at a time, per the concurrency model).

use crate::config::UpdaterConfig;
use crate::error::UpdaterError;
use crate::io::fsutil::{check_artifact, ArtifactCheck};
use bundle_schema::{Artifact, Index, Sha256Hex, UnpackCodec};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Hard cap on decompressed artifact size.
pub const MAX_DECOMPRESSED_BYTES: u64 = 1024 * 1024 * 1024;

/// A cooperative cancellation flag, checked between URL attempts, between
/// artifacts, and between swap steps — never mid-syscall.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    /// A signal that never fires.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear a previously requested cancellation so the signal can be
    /// reused for a new run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fetches the index and artifacts into the staging directory.
pub struct Downloader {
    client: reqwest::Client,
    config: Arc<UpdaterConfig>,
}

impl Downloader {
    /// Build a downloader with a client configured with the updater's
    /// user agent.
    ///
    /// # Panics
    ///
    /// Panics if the underlying `reqwest::Client` fails to build, which
    /// only happens for a malformed TLS configuration.
    pub fn new(config: Arc<UpdaterConfig>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .expect("reqwest client configuration is always valid");
        Self { client, config }
    }

    /// Iterate mirror URLs in order; on the first 2xx response, parse and
    /// verify the body and write it to the staging directory. If every
    /// mirror fails, return the last error.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::ArtifactDownloadFailed`] if every mirror
    /// fails, or [`UpdaterError::Index`] if a response body fails to
    /// parse/verify.
    pub async fn fetch_index(&self, cancel: &CancelSignal) -> Result<Index, UpdaterError> {
        let mut last_err: Option<String> = None;
        for url in &self.config.index_urls {
            if cancel.is_cancelled() {
                return Err(UpdaterError::ArtifactDownloadFailed {
                    name: "index".to_string(),
                    reason: "cancelled".to_string(),
                });
            }
            match self.fetch_one_index(url).await {
                Ok(index) => {
                    let bytes = index
                        .to_json_bytes()
                        .map_err(|e| UpdaterError::Index(bundle_schema::IndexError::Malformed(e.to_string())))?;
                    let path = self.config.staging_dir.join(&self.config.index_filename);
                    tokio::fs::create_dir_all(&self.config.staging_dir).await?;
                    tokio::fs::write(&path, &bytes).await?;
                    return Ok(index);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(UpdaterError::ArtifactDownloadFailed {
            name: "index".to_string(),
            reason: last_err.unwrap_or_else(|| "no mirrors configured".to_string()),
        })
    }

    async fn fetch_one_index(&self, url: &str) -> Result<Index, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("mirror returned status {}", response.status()));
        }
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;

        let signature = if self.config.trust_store.is_some() {
            let sig_url = format!("{url}.sig");
            let sig_response = self
                .client
                .get(&sig_url)
                .send()
                .await
                .map_err(|e| format!("fetching detached signature: {e}"))?;
            if !sig_response.status().is_success() {
                return Err(format!(
                    "signature sidecar returned status {}",
                    sig_response.status()
                ));
            }
            Some(
                sig_response
                    .text()
                    .await
                    .map_err(|e| e.to_string())?
                    .trim()
                    .to_string(),
            )
        } else {
            None
        };

        let trust = self
            .config
            .trust_store
            .as_ref()
            .zip(signature.as_deref());
        Index::parse(&bytes, trust, &self.config.platform, self.config.future_tolerance_secs)
            .map_err(|e| e.to_string())
    }

    /// Bring every artifact named by `index` into the staging directory,
    /// sorted by filename for determinism. For each artifact: probe
    /// active, staging, and purge-hold (in that order) for a reusable
    /// copy; otherwise download from its URL list, falling through on
    /// failure, decompressing and hash-checking before the commit-point
    /// rename.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::ArtifactDownloadFailed`],
    /// [`UpdaterError::ArtifactHashMismatch`],
    /// [`UpdaterError::ArtifactDecompressFailed`], or
    /// [`UpdaterError::ArtifactUnpackMultipleFiles`] on the first artifact
    /// that cannot be satisfied.
    pub async fn download_artifacts(
        &self,
        index: &Index,
        cancel: &CancelSignal,
    ) -> Result<(), UpdaterError> {
        tokio::fs::create_dir_all(&self.config.staging_dir).await?;
        for artifact in &index.artifacts {
            if cancel.is_cancelled() {
                return Err(UpdaterError::ArtifactDownloadFailed {
                    name: artifact.filename.clone(),
                    reason: "cancelled".to_string(),
                });
            }
            if self.try_reuse(artifact).await? {
                continue;
            }
            self.download_one(artifact, cancel).await?;
        }
        Ok(())
    }

    /// Probe active, staging, and purge-hold directories for a byte-exact
    /// reusable copy of `artifact`, copying it into staging under its
    /// target name on a match.
    async fn try_reuse(&self, artifact: &Artifact) -> Result<bool, UpdaterError> {
        let staging_target = self.config.staging_dir.join(&artifact.filename);
        if check_artifact(&self.config.staging_dir, &artifact.filename, &artifact.sha256)
            == ArtifactCheck::Ok
        {
            return Ok(true);
        }
        for candidate_dir in [
            &self.config.active_dir,
            &self.config.purge_hold_dir,
        ] {
            if check_artifact(candidate_dir, &artifact.filename, &artifact.sha256) == ArtifactCheck::Ok
            {
                let source = candidate_dir.join(&artifact.filename);
                tokio::fs::copy(&source, &staging_target).await?;
                set_permissions(&staging_target, artifact.mode()).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn download_one(&self, artifact: &Artifact, cancel: &CancelSignal) -> Result<(), UpdaterError> {
        let mut last_err: Option<String> = None;
        for url in &artifact.urls {
            if cancel.is_cancelled() {
                return Err(UpdaterError::ArtifactDownloadFailed {
                    name: artifact.filename.clone(),
                    reason: "cancelled".to_string(),
                });
            }
            match self.download_attempt(artifact, url).await {
                Ok(()) => return Ok(()),
                Err(AttemptError::Retryable(msg)) => last_err = Some(msg),
                Err(AttemptError::Terminal(e)) => return Err(e),
            }
        }
        Err(UpdaterError::ArtifactDownloadFailed {
            name: artifact.filename.clone(),
            reason: last_err.unwrap_or_else(|| "no urls".to_string()),
        })
    }

    async fn download_attempt(&self, artifact: &Artifact, url: &str) -> Result<(), AttemptError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AttemptError::Retryable(format!(
                "status {}",
                response.status()
            )));
        }
        let raw = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Retryable(e.to_string()))?;

        let decoded = decompress(&raw, artifact.unpack, &artifact.filename)
            .await
            .map_err(AttemptError::Terminal)?;

        let actual = Sha256Hex::digest(&decoded);
        if actual != artifact.sha256 {
            return Err(AttemptError::Terminal(UpdaterError::ArtifactHashMismatch {
                name: artifact.filename.clone(),
                expected: artifact.sha256.to_string(),
                actual: actual.to_string(),
            }));
        }

        let download_tmp = self
            .config
            .staging_dir
            .join(format!("{}.download", artifact.filename));
        tokio::fs::write(&download_tmp, &decoded)
            .await
            .map_err(|e| AttemptError::Terminal(e.into()))?;
        set_permissions(&download_tmp, artifact.mode())
            .await
            .map_err(|e| AttemptError::Terminal(e.into()))?;
        let target = self.config.staging_dir.join(&artifact.filename);
        tokio::fs::rename(&download_tmp, &target)
            .await
            .map_err(|e| AttemptError::Terminal(e.into()))?;
        Ok(())
    }
}

enum AttemptError {
    Retryable(String),
    Terminal(UpdaterError),
}

#[cfg(unix)]
async fn set_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Decompress `raw` per `codec`, enforcing [`MAX_DECOMPRESSED_BYTES`].
async fn decompress(
    raw: &[u8],
    codec: UnpackCodec,
    filename: &str,
) -> Result<Vec<u8>, UpdaterError> {
    match codec {
        UnpackCodec::None => Ok(raw.to_vec()),
        UnpackCodec::Gz => decompress_gzip(raw, filename).await,
        UnpackCodec::Zip => decompress_zip(raw, filename).await,
    }
}

async fn decompress_gzip(raw: &[u8], filename: &str) -> Result<Vec<u8>, UpdaterError> {
    let cursor = Cursor::new(raw.to_vec());
    let buffered = tokio::io::BufReader::new(cursor);
    let decoder = async_compression::tokio::bufread::GzipDecoder::new(buffered);
    let mut limited = decoder.take(MAX_DECOMPRESSED_BYTES + 1);
    let mut out = Vec::new();
    limited
        .read_to_end(&mut out)
        .await
        .map_err(|e| UpdaterError::ArtifactDecompressFailed {
            name: filename.to_string(),
            reason: e.to_string(),
        })?;
    if out.len() as u64 > MAX_DECOMPRESSED_BYTES {
        return Err(UpdaterError::ArtifactDecompressFailed {
            name: filename.to_string(),
            reason: format!("decompressed size exceeds {MAX_DECOMPRESSED_BYTES} bytes"),
        });
    }
    Ok(out)
}

async fn decompress_zip(raw: &[u8], filename: &str) -> Result<Vec<u8>, UpdaterError> {
    let raw = raw.to_vec();
    let name = filename.to_string();
    tokio::task::spawn_blocking(move || decompress_zip_blocking(&raw, &name))
        .await
        .map_err(|e| UpdaterError::ArtifactDecompressFailed {
            name: filename.to_string(),
            reason: e.to_string(),
        })?
}

fn decompress_zip_blocking(raw: &[u8], filename: &str) -> Result<Vec<u8>, UpdaterError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(raw)).map_err(|e| {
        UpdaterError::ArtifactDecompressFailed {
            name: filename.to_string(),
            reason: e.to_string(),
        }
    })?;
    if archive.len() != 1 {
        return Err(UpdaterError::ArtifactUnpackMultipleFiles {
            name: filename.to_string(),
            count: archive.len(),
        });
    }
    let mut entry = archive.by_index(0).map_err(|e| UpdaterError::ArtifactDecompressFailed {
        name: filename.to_string(),
        reason: e.to_string(),
    })?;
    let mut out = Vec::new();
    let cap = MAX_DECOMPRESSED_BYTES + 1;
    std::io::copy(&mut entry.by_ref().take(cap), &mut out).map_err(|e| {
        UpdaterError::ArtifactDecompressFailed {
            name: filename.to_string(),
            reason: e.to_string(),
        }
    })?;
    if out.len() as u64 > MAX_DECOMPRESSED_BYTES {
        return Err(UpdaterError::ArtifactDecompressFailed {
            name: filename.to_string(),
            reason: format!("decompressed size exceeds {MAX_DECOMPRESSED_BYTES} bytes"),
        });
    }
    Ok(out)
}

/// Remove stray `.download` and `.copy` temp files left behind by a failed
/// update, both on explicit failure cleanup and on next start.
pub async fn clean_temp_files(staging_dir: &Path) -> std::io::Result<()> {
    let mut entries = match tokio::fs::read_dir(staging_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_temp = path
            .extension()
            .is_some_and(|ext| ext == "download" || ext == "copy");
        if is_temp {
            tokio::fs::remove_file(&path).await.ok();
        }
    }
    Ok(())
}
