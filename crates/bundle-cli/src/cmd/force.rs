use bundle_core::Updater;
use std::sync::Arc;

pub async fn run(updater: &Arc<Updater>) -> anyhow::Result<()> {
    updater.force_update().await?;
    println!("update forced and applied");
    Ok(())
}
