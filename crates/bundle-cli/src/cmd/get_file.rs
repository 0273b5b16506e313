use bundle_core::Updater;
use std::sync::Arc;

pub fn run(updater: &Arc<Updater>, name: &str) -> anyhow::Result<()> {
    let artifact = updater.get_file(name)?;
    println!("filename: {}", artifact.filename);
    println!("sha256: {}", artifact.sha256);
    println!("version: {}", artifact.parsed_version());
    println!("path: {}", artifact.local_path().display());
    Ok(())
}
