use bundle_core::Updater;
use std::sync::Arc;

pub fn run(updater: &Arc<Updater>) -> anyhow::Result<()> {
    let index = updater.get_index();
    println!("bundle: {}", index.name);
    println!("version: {}", index.version);
    println!("published: {}", index.published);
    println!("verified: {}", index.is_verified());
    println!("corrupted: {}", updater.is_corrupted());
    println!("artifacts: {}", index.artifacts.len());
    Ok(())
}
