//! The state machine that orchestrates checks and upgrades, enforces
//! one-at-a-time, publishes notifications, and serves the lookup API.
//!
//! The single-flight flag is a plain `AtomicBool`, the same primitive the
//! teacher uses to guard concurrent actor access from multiple trigger
//! paths. The periodic worker is a `tokio::time::interval` loop spawned
//! from `start`, matching the teacher's direct use of async `reqwest`
//! (unlike `rt-updater`'s sync `self_update` crate, which needs
//! `spawn_blocking`; this crate's HTTP client is already async end to
//! end).

use crate::config::UpdaterConfig;
use crate::error::UpdaterError;
use crate::io::download::{clean_temp_files, CancelSignal, Downloader};
use crate::io::fsutil::verify_artifacts;
use crate::notifier::{Notifier, NotifyAction, NotifyEvent, NotifyKind};
use crate::swap;
use bundle_schema::{Artifact, Index, UpgradeOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;

/// How a particular invocation of the update flow should behave, derived
/// from which Trigger API operation requested it.
#[derive(Debug, Clone, Default)]
struct RunMode {
    /// Bypass `auto_download`/`auto_apply` and proceed regardless.
    force: bool,
    /// Bypass the version comparison entirely (`ForceUpdate`).
    ignore_version: bool,
    /// Treat this single URL as the sole mirror for this run.
    single_url: Option<String>,
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Orchestrates index checks, downloads, and atomic swaps for one bundle.
/// Multiple instances may coexist (e.g. one for binaries, one for intel
/// data); nothing here is process-global.
pub struct Updater {
    config: RwLock<UpdaterConfig>,
    current_index: RwLock<Index>,
    notifier: Arc<dyn Notifier>,
    is_update_running: AtomicBool,
    started: AtomicBool,
    corrupted: AtomicBool,
    cancel: CancelSignal,
    periodic_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Updater {
    /// Construct an updater, loading the existing index from the active
    /// directory if present (falling back to [`Index::bootstrap`]) and
    /// running the startup integrity check.
    pub fn new(config: UpdaterConfig, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        let (initial_index, corrupted) = load_initial_index(&config);
        let updater = Arc::new(Self {
            config: RwLock::new(config),
            current_index: RwLock::new(initial_index),
            notifier,
            is_update_running: AtomicBool::new(false),
            started: AtomicBool::new(false),
            corrupted: AtomicBool::new(corrupted),
            cancel: CancelSignal::new(),
            periodic_handle: std::sync::Mutex::new(None),
        });
        if corrupted {
            let bundle_name = updater.config.read().unwrap().bundle_name.clone();
            updater.notifier.notify(&NotifyEvent {
                event_id: format!("updater:{bundle_name}:corrupted"),
                bundle_name,
                kind: NotifyKind::CorruptedInstallation {
                    reason: "startup integrity check failed".to_string(),
                },
                action: None,
            });
        }
        updater
    }

    /// Whether the active installation failed its startup integrity
    /// check. Published as a persistent state, not a function error; a
    /// fresh update will replace the bad files.
    pub fn is_corrupted(&self) -> bool {
        self.corrupted.load(Ordering::SeqCst)
    }

    /// Start the periodic worker if `auto_check` is set. Idempotent.
    ///
    /// Clears any cancellation requested by a prior `stop()`, so a
    /// stop-then-start cycle (including the one `configure` performs
    /// internally) can run updates again rather than having every future
    /// run immediately observe a stale cancellation.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.reset();
        let auto_check = self.config.read().unwrap().auto_check;
        if !auto_check {
            return;
        }
        self.spawn_periodic_worker();
    }

    /// Stop the periodic worker. Does not tear down a swap in progress:
    /// cancellation is cooperative and only takes effect at the boundaries
    /// named in the concurrency model. Idempotent.
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.periodic_handle.lock().unwrap().take() {
            handle.abort();
        }
        self.cancel.cancel();
    }

    fn spawn_periodic_worker(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let (initial_delay, interval) = {
            let config = this.config.read().unwrap();
            (config.initial_delay_secs, config.check_interval_secs)
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(initial_delay)).await;
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval));
            loop {
                ticker.tick().await;
                if !this.started.load(Ordering::SeqCst) {
                    break;
                }
                let _ = this.run(RunMode::default()).await;
            }
        });
        *self.periodic_handle.lock().unwrap() = Some(handle);
    }

    /// Request the check worker to run. Non-blocking; if an update is
    /// already running, the request is silently coalesced.
    pub fn trigger_update_check(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _ = this.check_now().await;
        });
    }

    /// Request the apply worker to run: continues an already-staged
    /// candidate (or fetches one) and forces past the `auto_download`/
    /// `auto_apply` gates, since this is an explicit user trigger.
    /// Non-blocking; coalesced.
    pub fn trigger_apply_updates(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _ = this.apply_now().await;
        });
    }

    /// Synchronous form of [`Updater::trigger_update_check`]: runs the
    /// normal policy-gated check flow and returns its outcome, for callers
    /// (the CLI's `status`/`check` commands, tests) that want to observe
    /// the result directly rather than polling.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::AlreadyRunning`], [`UpdaterError::SameIndex`],
    /// [`UpdaterError::ActionRequired`], or any error from the
    /// download/swap pipeline.
    pub async fn check_now(self: &Arc<Self>) -> Result<(), UpdaterError> {
        self.run(RunMode::default()).await
    }

    /// Synchronous form of [`Updater::trigger_apply_updates`].
    ///
    /// # Errors
    ///
    /// Same as [`Updater::check_now`].
    pub async fn apply_now(self: &Arc<Self>) -> Result<(), UpdaterError> {
        self.run(RunMode {
            force: true,
            ignore_version: false,
            single_url: None,
        })
        .await
    }

    /// Synchronously perform a full update, ignoring the version check and
    /// every policy flag.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::AlreadyRunning`] if another update is in
    /// progress, or any error from the download/swap pipeline.
    pub async fn force_update(self: &Arc<Self>) -> Result<(), UpdaterError> {
        self.run(RunMode {
            force: true,
            ignore_version: true,
            single_url: None,
        })
        .await
    }

    /// Asynchronously update from a single URL, treated as the sole
    /// mirror; forces the apply step.
    ///
    /// # Errors
    ///
    /// Same as [`Updater::force_update`].
    pub async fn update_from_url(self: &Arc<Self>, url: String) -> Result<(), UpdaterError> {
        self.run(RunMode {
            force: true,
            ignore_version: false,
            single_url: Some(url),
        })
        .await
    }

    /// Replace the mirror list and the auto-check flag, and reschedule the
    /// periodic worker accordingly.
    pub fn configure(self: &Arc<Self>, auto_check: bool, index_urls: Vec<String>) {
        {
            let mut config = self.config.write().unwrap();
            config.auto_check = auto_check;
            config.index_urls = index_urls;
        }
        if self.started.load(Ordering::SeqCst) {
            self.stop();
            self.started.store(false, Ordering::SeqCst);
            self.start();
        }
    }

    /// Look up a single artifact by logical filename.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::NotFound`] if no artifact with that name is
    /// in the current index.
    pub fn get_file(&self, name: &str) -> Result<Artifact, UpdaterError> {
        let index = self.current_index.read().unwrap();
        index
            .artifact(name)
            .cloned()
            .ok_or_else(|| UpdaterError::NotFound(name.to_string()))
    }

    /// Snapshot of every artifact in the current index.
    pub fn get_files(&self) -> Vec<Artifact> {
        self.current_index.read().unwrap().artifacts.clone()
    }

    /// Deep copy of the current index.
    pub fn get_index(&self) -> Index {
        self.current_index.read().unwrap().clone()
    }

    async fn run(self: &Arc<Self>, mode: RunMode) -> Result<(), UpdaterError> {
        if self
            .is_update_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(UpdaterError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.is_update_running);

        let (config_snapshot, bundle_name) = {
            let mut config = self.config.read().unwrap().clone();
            if let Some(url) = &mode.single_url {
                config.index_urls = vec![url.clone()];
            }
            let bundle_name = config.bundle_name.clone();
            (Arc::new(config), bundle_name)
        };

        let result = self.run_inner(&config_snapshot, &mode).await;

        match &result {
            Ok(()) => {}
            Err(e) if e.is_user_facing_failure() && config_snapshot.notify => {
                self.notifier.notify(&NotifyEvent {
                    event_id: format!("updater:{bundle_name}:failed"),
                    bundle_name: bundle_name.clone(),
                    kind: NotifyKind::UpdateFailed {
                        reason: e.to_string(),
                    },
                    action: None,
                });
            }
            Err(_) => {}
        }
        clean_temp_files(&config_snapshot.staging_dir).await.ok();
        result
    }

    async fn run_inner(
        self: &Arc<Self>,
        config: &Arc<UpdaterConfig>,
        mode: &RunMode,
    ) -> Result<(), UpdaterError> {
        let downloader = Downloader::new(Arc::clone(config));
        let candidate = downloader.fetch_index(&self.cancel).await?;

        let current = self.current_index.read().unwrap().clone();
        let outcome = Index::should_upgrade_to(&current, &candidate);

        if !mode.ignore_version {
            match outcome {
                UpgradeOutcome::SameIndex => {
                    if config.notify {
                        self.notifier.notify(&NotifyEvent {
                            event_id: format!("updater:{}:up-to-date", config.bundle_name),
                            bundle_name: config.bundle_name.clone(),
                            kind: NotifyKind::UpToDate,
                            action: None,
                        });
                    }
                    return Err(UpdaterError::SameIndex);
                }
                UpgradeOutcome::NoUpdateAvailable => return Err(UpdaterError::NoUpdateAvailable),
                UpgradeOutcome::Upgrade => {}
            }
        }

        let should_download = mode.force || mode.ignore_version || config.auto_download;
        if !should_download {
            if config.notify {
                self.notifier.notify(&NotifyEvent {
                    event_id: format!("updater:{}:available:{}", config.bundle_name, candidate.version),
                    bundle_name: config.bundle_name.clone(),
                    kind: NotifyKind::UpdateAvailable {
                        version: candidate.version.clone(),
                    },
                    action: Some(NotifyAction::OpenSetting("updates".to_string())),
                });
                return Ok(());
            }
            return Err(UpdaterError::ActionRequired);
        }

        downloader.download_artifacts(&candidate, &self.cancel).await?;

        let should_apply = mode.force || mode.ignore_version || config.auto_apply;
        if !should_apply {
            if config.notify {
                self.notifier.notify(&NotifyEvent {
                    event_id: format!("updater:{}:ready:{}", config.bundle_name, candidate.version),
                    bundle_name: config.bundle_name.clone(),
                    kind: NotifyKind::UpdateReady {
                        version: candidate.version.clone(),
                    },
                    action: Some(NotifyAction::OpenSetting("updates".to_string())),
                });
                return Ok(());
            }
            return Err(UpdaterError::ActionRequired);
        }

        swap::swap(config, &candidate, &self.cancel).await?;

        let mut rebased = candidate;
        rebased.rebase(&config.active_dir);
        {
            let mut current = self.current_index.write().unwrap();
            *current = rebased;
        }
        self.corrupted.store(false, Ordering::SeqCst);

        if config.needs_restart {
            if config.notify {
                self.notifier.notify(&NotifyEvent {
                    event_id: format!("updater:{}:restart-required", config.bundle_name),
                    bundle_name: config.bundle_name.clone(),
                    kind: NotifyKind::RestartRequired,
                    action: None,
                });
            } else {
                self.notifier.request_restart(&config.bundle_name);
            }
        }
        Ok(())
    }
}

fn load_initial_index(config: &UpdaterConfig) -> (Index, bool) {
    let index_path = config.active_dir.join(&config.index_filename);
    let bytes = match std::fs::read(&index_path) {
        Ok(bytes) => bytes,
        Err(_) => return (Index::bootstrap(), false),
    };
    let trust = config
        .trust_store
        .as_ref()
        .map(|ts| (ts, read_sidecar_signature(&index_path).unwrap_or_default()));
    let trust_ref = trust.as_ref().map(|(ts, sig)| (*ts, sig.as_str()));
    let mut index = match Index::parse(&bytes, trust_ref, &config.platform, config.future_tolerance_secs) {
        Ok(index) => index,
        Err(_) => return (Index::bootstrap(), true),
    };
    index.rebase(&config.active_dir);
    let corrupted = verify_artifacts(&config.active_dir, &index).is_err();
    (index, corrupted)
}

fn read_sidecar_signature(index_path: &std::path::Path) -> Option<String> {
    let sig_path = index_path.with_extension(
        index_path
            .extension()
            .map(|e| format!("{}.sig", e.to_string_lossy()))
            .unwrap_or_else(|| "sig".to_string()),
    );
    std::fs::read_to_string(sig_path).ok().map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NullNotifier;
    use bundle_schema::{Platform, Sha256Hex};
    use std::collections::HashSet;

    fn test_config(active: &std::path::Path, staging: &std::path::Path, purge: &std::path::Path) -> UpdaterConfig {
        UpdaterConfig {
            bundle_name: "Test".to_string(),
            active_dir: active.to_path_buf(),
            staging_dir: staging.to_path_buf(),
            purge_hold_dir: purge.to_path_buf(),
            ignore_names: HashSet::new(),
            index_urls: vec![],
            index_filename: "index.json".to_string(),
            trust_store: None,
            platform: Platform::cross_platform(),
            auto_check: false,
            auto_download: true,
            auto_apply: true,
            needs_restart: false,
            notify: false,
            future_tolerance_secs: 900,
            check_interval_secs: 3600,
            initial_delay_secs: 15,
            user_agent: "bundle-updater-test".to_string(),
        }
    }

    #[tokio::test]
    async fn bootstrap_on_empty_active_dir() {
        let active = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let purge = tempfile::tempdir().unwrap();
        let config = test_config(active.path(), staging.path(), purge.path());
        let updater = Updater::new(config, Arc::new(NullNotifier));
        assert!(updater.get_index().is_bootstrap());
        assert!(!updater.is_corrupted());
    }

    #[tokio::test]
    async fn force_update_bootstraps_first_install() {
        let active = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let purge = tempfile::tempdir().unwrap();
        std::fs::write(staging.path().join("index.json"), b"{}").unwrap();
        std::fs::write(staging.path().join("a.bin"), b"").unwrap();

        let mut server = mockito::Server::new_async().await;
        let json = format!(
            r#"{{"Name":"Test","Version":"1.0.0","Published":"2024-01-01T00:00:00Z",
            "Artifacts":[{{"Filename":"a.bin","SHA256":"{h}","URLs":["{url}/a.bin"]}}]}}"#,
            h = Sha256Hex::of_empty(),
            url = server.url(),
        );
        let _idx_mock = server
            .mock("GET", "/index.json")
            .with_status(200)
            .with_body(&json)
            .create_async()
            .await;
        let _art_mock = server
            .mock("GET", "/a.bin")
            .with_status(200)
            .with_body(b"".to_vec())
            .create_async()
            .await;

        let mut config = test_config(active.path(), staging.path(), purge.path());
        config.index_urls = vec![format!("{}/index.json", server.url())];

        let updater = Updater::new(config, Arc::new(NullNotifier));
        updater.force_update().await.unwrap();

        let file = updater.get_file("a.bin").unwrap();
        assert_eq!(file.parsed_version().to_string(), "1.0.0");
        assert!(active.path().join("a.bin").exists());
    }

    #[tokio::test]
    async fn single_flight_rejects_concurrent_run() {
        let active = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let purge = tempfile::tempdir().unwrap();
        let config = test_config(active.path(), staging.path(), purge.path());
        let updater = Updater::new(config, Arc::new(NullNotifier));

        updater.is_update_running.store(true, Ordering::SeqCst);
        let err = updater.force_update().await.unwrap_err();
        assert!(matches!(err, UpdaterError::AlreadyRunning));
    }

    #[tokio::test]
    async fn start_spawns_periodic_worker_only_when_auto_check() {
        let active = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let purge = tempfile::tempdir().unwrap();
        let config = test_config(active.path(), staging.path(), purge.path());
        let updater = Updater::new(config, Arc::new(NullNotifier));

        updater.start();
        assert!(updater.periodic_handle.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_aborts_the_worker() {
        let active = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let purge = tempfile::tempdir().unwrap();
        let mut config = test_config(active.path(), staging.path(), purge.path());
        config.auto_check = true;
        let updater = Updater::new(config, Arc::new(NullNotifier));

        updater.start();
        let first_handle_id = updater
            .periodic_handle
            .lock()
            .unwrap()
            .as_ref()
            .map(tokio::task::JoinHandle::id);
        assert!(first_handle_id.is_some());

        updater.start();
        let second_handle_id = updater
            .periodic_handle
            .lock()
            .unwrap()
            .as_ref()
            .map(tokio::task::JoinHandle::id);
        assert_eq!(first_handle_id, second_handle_id, "start() must be idempotent");

        updater.stop();
        assert!(updater.periodic_handle.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn configure_while_started_does_not_poison_the_next_run() {
        let active = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let purge = tempfile::tempdir().unwrap();
        std::fs::write(staging.path().join("index.json"), b"{}").unwrap();
        std::fs::write(staging.path().join("a.bin"), b"").unwrap();

        let mut server = mockito::Server::new_async().await;
        let json = format!(
            r#"{{"Name":"Test","Version":"1.0.0","Published":"2024-01-01T00:00:00Z",
            "Artifacts":[{{"Filename":"a.bin","SHA256":"{h}","URLs":["{url}/a.bin"]}}]}}"#,
            h = Sha256Hex::of_empty(),
            url = server.url(),
        );
        let _idx_mock = server.mock("GET", "/index.json").with_status(200).with_body(&json).create_async().await;
        let _art_mock = server
            .mock("GET", "/a.bin")
            .with_status(200)
            .with_body(b"".to_vec())
            .create_async()
            .await;

        let config = test_config(active.path(), staging.path(), purge.path());
        let updater = Updater::new(config, Arc::new(NullNotifier));

        updater.start();
        // configure() while already started runs an internal stop-then-start
        // cycle; a stop() that permanently poisons self.cancel would make
        // the force_update() below fail forever.
        updater.configure(false, vec![format!("{}/index.json", server.url())]);

        updater.force_update().await.unwrap();
        assert!(active.path().join("a.bin").exists());
    }

    #[tokio::test]
    async fn update_from_url_overrides_the_mirror_list_for_one_run() {
        let active = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let purge = tempfile::tempdir().unwrap();
        std::fs::write(staging.path().join("index.json"), b"{}").unwrap();
        std::fs::write(staging.path().join("a.bin"), b"").unwrap();

        let mut server = mockito::Server::new_async().await;
        let json = format!(
            r#"{{"Name":"Test","Version":"1.0.0","Published":"2024-01-01T00:00:00Z",
            "Artifacts":[{{"Filename":"a.bin","SHA256":"{h}","URLs":["{url}/a.bin"]}}]}}"#,
            h = Sha256Hex::of_empty(),
            url = server.url(),
        );
        let _idx_mock = server.mock("GET", "/index.json").with_status(200).with_body(&json).create_async().await;
        let _art_mock = server
            .mock("GET", "/a.bin")
            .with_status(200)
            .with_body(b"".to_vec())
            .create_async()
            .await;

        // The configured mirror list points nowhere; update_from_url must
        // still succeed because it substitutes its own URL for this run.
        let mut config = test_config(active.path(), staging.path(), purge.path());
        config.index_urls = vec!["https://unreachable.invalid/index.json".to_string()];
        let updater = Updater::new(config, Arc::new(NullNotifier));

        updater
            .update_from_url(format!("{}/index.json", server.url()))
            .await
            .unwrap();
        assert!(active.path().join("a.bin").exists());
    }

    #[tokio::test]
    async fn get_file_reports_not_found() {
        let active = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let purge = tempfile::tempdir().unwrap();
        let config = test_config(active.path(), staging.path(), purge.path());
        let updater = Updater::new(config, Arc::new(NullNotifier));
        assert!(matches!(
            updater.get_file("missing"),
            Err(UpdaterError::NotFound(_))
        ));
    }
}
