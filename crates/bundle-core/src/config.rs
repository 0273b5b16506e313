//! Updater configuration: immutable per instance after construction, with
//! a `configure` operation that replaces the mutable subset under the same
//! lock used for updates.

use bundle_schema::{Platform, TrustStore};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// Default interval between periodic checks, in seconds (1 hour).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 3600;
/// Initial delay before the first periodic check after `Start`, in seconds.
pub const DEFAULT_INITIAL_DELAY_SECS: u64 = 15;
/// Default clock-skew tolerance for index publication timestamps, in
/// seconds (see the open question on clock skew).
pub const DEFAULT_FUTURE_TOLERANCE_SECS: i64 = 900;
/// Default on-disk name of the index file.
pub const DEFAULT_INDEX_FILENAME: &str = "index.json";

/// Immutable configuration for one [`crate::updater::Updater`] instance.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Bundle name, used in logs and notifications.
    pub bundle_name: String,
    /// Directory consumers read artifacts from.
    pub active_dir: PathBuf,
    /// Directory where the next candidate bundle is assembled.
    pub staging_dir: PathBuf,
    /// Directory where the previous bundle's files are parked during a
    /// swap, for rollback.
    pub purge_hold_dir: PathBuf,
    /// Names within the active directory the updater must never touch.
    pub ignore_names: HashSet<String>,
    /// Ordered list of index mirror URLs, tried in order.
    pub index_urls: Vec<String>,
    /// On-disk name of the index file within each directory.
    pub index_filename: String,
    /// Optional trust store; when present every index is signature
    /// checked.
    pub trust_store: Option<TrustStore>,
    /// Target platform used to filter artifacts at load time.
    pub platform: Platform,
    /// May poll mirrors for a candidate index.
    pub auto_check: bool,
    /// May fetch artifacts into staging without confirmation.
    pub auto_download: bool,
    /// May swap staging into active without confirmation. Requires
    /// `auto_download`.
    pub auto_apply: bool,
    /// The service must restart after a successful swap.
    pub needs_restart: bool,
    /// User-facing notifications are desired; when off, a restart is
    /// triggered automatically rather than requested.
    pub notify: bool,
    /// Clock-skew tolerance for `published` timestamps, in seconds.
    pub future_tolerance_secs: i64,
    /// Interval between periodic checks, in seconds.
    pub check_interval_secs: u64,
    /// Delay before the first periodic check after `Start`, in seconds.
    pub initial_delay_secs: u64,
    /// `User-Agent` header sent with every HTTP request.
    pub user_agent: String,
}

/// On-disk TOML shape for [`UpdaterConfig`], used by the demonstration CLI.
/// Field names mirror the struct 1:1; the trust store, if any, is supplied
/// out of band since a public key does not belong in a config file meant
/// to be hand-edited alongside untrusted mirror URLs in the same breath.
#[derive(Debug, Deserialize)]
pub struct UpdaterConfigFile {
    pub bundle_name: String,
    pub active_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub purge_hold_dir: PathBuf,
    #[serde(default)]
    pub ignore_names: Vec<String>,
    pub index_urls: Vec<String>,
    #[serde(default = "default_index_filename")]
    pub index_filename: String,
    #[serde(default)]
    pub auto_check: bool,
    #[serde(default)]
    pub auto_download: bool,
    #[serde(default)]
    pub auto_apply: bool,
    #[serde(default)]
    pub needs_restart: bool,
    #[serde(default)]
    pub notify: bool,
    #[serde(default = "default_future_tolerance")]
    pub future_tolerance_secs: i64,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
}

fn default_index_filename() -> String {
    DEFAULT_INDEX_FILENAME.to_string()
}
fn default_future_tolerance() -> i64 {
    DEFAULT_FUTURE_TOLERANCE_SECS
}
fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}
fn default_initial_delay() -> u64 {
    DEFAULT_INITIAL_DELAY_SECS
}

impl UpdaterConfigFile {
    /// Load and parse a TOML configuration file, following the same
    /// read-then-parse idiom used elsewhere for on-disk manifests.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse as
    /// valid TOML matching this shape.
    pub async fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let parsed = toml::from_str(&content)?;
        Ok(parsed)
    }

    /// Build the runtime [`UpdaterConfig`], attaching a trust store and
    /// user agent that do not belong in the on-disk file.
    pub fn into_config(self, trust_store: Option<TrustStore>, user_agent: String) -> UpdaterConfig {
        UpdaterConfig {
            bundle_name: self.bundle_name,
            active_dir: self.active_dir,
            staging_dir: self.staging_dir,
            purge_hold_dir: self.purge_hold_dir,
            ignore_names: self.ignore_names.into_iter().collect(),
            index_urls: self.index_urls,
            index_filename: self.index_filename,
            trust_store,
            platform: Platform::current(),
            auto_check: self.auto_check,
            auto_download: self.auto_download,
            auto_apply: self.auto_apply,
            needs_restart: self.needs_restart,
            notify: self.notify,
            future_tolerance_secs: self.future_tolerance_secs,
            check_interval_secs: self.check_interval_secs,
            initial_delay_secs: self.initial_delay_secs,
            user_agent,
        }
    }
}

impl UpdaterConfig {
    /// Whether `name` is in the ignore list and must be left untouched by
    /// every swap.
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore_names.contains(name)
    }
}
