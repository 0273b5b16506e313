use bundle_core::{Updater, UpdaterError};
use std::sync::Arc;

pub async fn run(updater: &Arc<Updater>) -> anyhow::Result<()> {
    match updater.check_now().await {
        Ok(()) => {
            println!("check completed");
            Ok(())
        }
        Err(UpdaterError::SameIndex) => {
            println!("already up to date");
            Ok(())
        }
        Err(UpdaterError::ActionRequired) => {
            println!("update available: run `apply` or `force` to continue");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!(e)),
    }
}
