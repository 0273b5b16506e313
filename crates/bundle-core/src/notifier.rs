//! Decouples the updater state machine from whatever UI presents its
//! progress, following the teacher's `Reporter` trait: object-safe, a
//! blanket impl over `Arc<T>`, and a no-op default.

use std::sync::Arc;

/// An action a UI may offer the user in response to a [`NotifyEvent`],
/// replacing an opaque "payload" field with a closed sum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyAction {
    /// Open a URL in the user's browser.
    OpenUrl(String),
    /// Open a named settings panel.
    OpenSetting(String),
    /// Invoke a webhook URL.
    CallWebhook(String),
    /// Inject a named event back into the host application's own event
    /// bus.
    InjectEvent(String),
}

/// One notification the state machine emits. `event_id` is stable per
/// logical occurrence so a UI can deduplicate repeated deliveries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyEvent {
    /// Stable identifier for deduplication, e.g. `"updater:{bundle}:up-to-date"`.
    pub event_id: String,
    /// Bundle this event concerns.
    pub bundle_name: String,
    /// The specific kind of event.
    pub kind: NotifyKind,
    /// Optional action a UI may present to the user.
    pub action: Option<NotifyAction>,
}

/// The fixed vocabulary of updater notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyKind {
    /// The active bundle is already current.
    UpToDate,
    /// A newer version exists but policy requires user confirmation.
    UpdateAvailable {
        /// Newly available version.
        version: String,
    },
    /// Artifacts were downloaded and staged; awaiting apply.
    UpdateReady {
        /// Staged version.
        version: String,
    },
    /// A successful swap requires a restart to take effect.
    RestartRequired,
    /// An update attempt failed.
    UpdateFailed {
        /// Human-readable cause.
        reason: String,
    },
    /// The startup integrity check found the active directory corrupted.
    CorruptedInstallation {
        /// Human-readable cause.
        reason: String,
    },
}

/// Receives fire-and-forget notifications from the updater state machine.
///
/// Implementations must be cheap and non-blocking; the state machine calls
/// these synchronously from within its own task.
pub trait Notifier: Send + Sync {
    /// Deliver a notification event.
    fn notify(&self, event: &NotifyEvent);

    /// Request that the host process restart, invoked immediately when a
    /// restart is needed and `notify` is off.
    fn request_restart(&self, bundle_name: &str);
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn notify(&self, event: &NotifyEvent) {
        (**self).notify(event);
    }

    fn request_restart(&self, bundle_name: &str) {
        (**self).request_restart(bundle_name);
    }
}

/// Default notifier used when no UI collaborator is attached: logs every
/// event via `tracing` and, per the restart rule, still triggers the
/// restart hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify(&self, event: &NotifyEvent) {
        match &event.kind {
            NotifyKind::UpToDate => {
                tracing::info!(bundle = %event.bundle_name, "up to date");
            }
            NotifyKind::UpdateAvailable { version } => {
                tracing::info!(bundle = %event.bundle_name, %version, "update available");
            }
            NotifyKind::UpdateReady { version } => {
                tracing::info!(bundle = %event.bundle_name, %version, "update ready");
            }
            NotifyKind::RestartRequired => {
                tracing::info!(bundle = %event.bundle_name, "restart required");
            }
            NotifyKind::UpdateFailed { reason } => {
                tracing::warn!(bundle = %event.bundle_name, %reason, "update failed");
            }
            NotifyKind::CorruptedInstallation { reason } => {
                tracing::error!(bundle = %event.bundle_name, %reason, "corrupted installation");
            }
        }
    }

    fn request_restart(&self, bundle_name: &str) {
        tracing::info!(bundle = %bundle_name, "restart requested");
    }
}

/// Silences all notifications; useful for tests and embeddings that poll
/// state explicitly instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: &NotifyEvent) {}
    fn request_restart(&self, _bundle_name: &str) {}
}
