use bundle_core::Updater;
use std::sync::Arc;

pub async fn run(updater: &Arc<Updater>, url: &str) -> anyhow::Result<()> {
    updater.update_from_url(url.to_string()).await?;
    println!("update forced from {url}");
    Ok(())
}
