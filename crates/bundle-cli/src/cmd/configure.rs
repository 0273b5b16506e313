use bundle_core::Updater;
use std::sync::Arc;

pub fn run(updater: &Arc<Updater>, auto_check: bool, index_urls: Vec<String>) -> anyhow::Result<()> {
    updater.configure(auto_check, index_urls);
    println!("configuration updated");
    Ok(())
}
