use bundle_core::{Updater, UpdaterError};
use std::sync::Arc;

pub async fn run(updater: &Arc<Updater>) -> anyhow::Result<()> {
    match updater.apply_now().await {
        Ok(()) => {
            println!("update applied");
            Ok(())
        }
        Err(UpdaterError::SameIndex) => {
            println!("already up to date");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!(e)),
    }
}
