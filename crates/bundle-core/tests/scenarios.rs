//! End-to-end scenarios, following the literal walkthroughs: bootstrap,
//! up-to-date no-op, auto-download-off, hash mismatch, swap-crash
//! rollback, and artifact reuse from the active directory.

use bundle_core::notifier::NullNotifier;
use bundle_core::{UpdaterConfig, UpdaterError};
use bundle_schema::{Index, Platform, Sha256Hex};
use std::collections::HashSet;
use std::sync::Arc;

fn config(active: &std::path::Path, staging: &std::path::Path, purge: &std::path::Path) -> UpdaterConfig {
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

async fn serve_index(server: &mut mockito::ServerGuard, json: &str) -> mockito::Mock {
    server
        .mock("GET", "/index.json")
        .with_status(200)
        .with_body(json)
        .create_async()
        .await
}

#[tokio::test]
async fn bootstrap_to_first_install() {
    let active = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let purge = tempfile::tempdir().unwrap();

    let mut server = mockito::Server::new_async().await;
    let json = format!(
        r#"{{"Name":"Test","Version":"1.0.0","Published":"2024-01-01T00:00:00Z",
        "Artifacts":[{{"Filename":"a.bin","SHA256":"{h}","URLs":["{url}/a.bin"]}}]}}"#,
        h = Sha256Hex::of_empty(),
        url = server.url(),
    );
    let _idx = serve_index(&mut server, &json).await;
    let _art = server
        .mock("GET", "/a.bin")
        .with_status(200)
        .with_body(b"".to_vec())
        .create_async()
        .await;

    let mut cfg = config(active.path(), staging.path(), purge.path());
    cfg.index_urls = vec![format!("{}/index.json", server.url())];
    let updater = bundle_core::Updater::new(cfg, Arc::new(NullNotifier));

    updater.force_update().await.unwrap();

    assert!(active.path().join("index.json").exists());
    assert!(active.path().join("a.bin").exists());
    let file = updater.get_file("a.bin").unwrap();
    assert_eq!(file.parsed_version().to_string(), "1.0.0");
}

#[tokio::test]
async fn up_to_date_is_a_no_op() {
    let active = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let purge = tempfile::tempdir().unwrap();

    let json = r#"{"Name":"Test","Version":"1.0.0","Published":"2024-01-01T00:00:00Z","Artifacts":[]}"#;
    std::fs::write(active.path().join("index.json"), json).unwrap();

    let mut server = mockito::Server::new_async().await;
    let _idx = serve_index(&mut server, json).await;

    let mut cfg = config(active.path(), staging.path(), purge.path());
    cfg.index_urls = vec![format!("{}/index.json", server.url())];
    let updater = bundle_core::Updater::new(cfg, Arc::new(NullNotifier));

    let before: Vec<_> = std::fs::read_dir(purge.path()).unwrap().collect();
    assert!(before.is_empty());

    let err = updater.check_now().await;
    assert!(matches!(err, Err(UpdaterError::SameIndex)));

    let after: Vec<_> = std::fs::read_dir(active.path()).unwrap().collect();
    assert_eq!(after.len(), 1); // only index.json, untouched
}

#[tokio::test]
async fn newer_available_auto_download_off_then_forced() {
    let active = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let purge = tempfile::tempdir().unwrap();

    let old = r#"{"Name":"Test","Version":"1.0.0","Published":"2024-01-01T00:00:00Z","Artifacts":[]}"#;
    std::fs::write(active.path().join("index.json"), old).unwrap();

    let mut server = mockito::Server::new_async().await;
    let new = r#"{"Name":"Test","Version":"1.0.1","Published":"2024-02-01T00:00:00Z","Artifacts":[]}"#;
    let _idx = serve_index(&mut server, new).await;

    let mut cfg = config(active.path(), staging.path(), purge.path());
    cfg.index_urls = vec![format!("{}/index.json", server.url())];
    cfg.auto_download = false;
    let updater = bundle_core::Updater::new(cfg, Arc::new(NullNotifier));

    let err = updater.check_now().await;
    assert!(matches!(err, Err(UpdaterError::ActionRequired)));

    updater.force_update().await.unwrap();
    assert_eq!(updater.get_index().version, "1.0.1");
}

#[tokio::test]
async fn hash_mismatch_leaves_active_untouched() {
    let active = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let purge = tempfile::tempdir().unwrap();

    let mut server = mockito::Server::new_async().await;
    let bogus_hash = "d".repeat(64);
    let json = format!(
        r#"{{"Name":"Test","Version":"1.0.0","Published":"2024-01-01T00:00:00Z",
        "Artifacts":[{{"Filename":"a.bin","SHA256":"{bogus_hash}","URLs":["{url}/a.bin"]}}]}}"#,
        url = server.url(),
    );
    let _idx = serve_index(&mut server, &json).await;
    let _art = server
        .mock("GET", "/a.bin")
        .with_status(200)
        .with_body(b"actual content".to_vec())
        .create_async()
        .await;

    let mut cfg = config(active.path(), staging.path(), purge.path());
    cfg.index_urls = vec![format!("{}/index.json", server.url())];
    let updater = bundle_core::Updater::new(cfg, Arc::new(NullNotifier));

    let err = updater.force_update().await.unwrap_err();
    assert!(matches!(err, UpdaterError::ArtifactHashMismatch { .. }));
    assert!(std::fs::read_dir(active.path()).unwrap().next().is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn swap_crash_mid_step_one_rolls_back_and_leaves_index_unchanged() {
    use bundle_core::io::fsutil::verify_artifacts;
    use std::os::unix::fs::PermissionsExt;

    let active = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    // Forces every step-1 move into the copy-fallback path (rather than a
    // same-device rename, which the kernel performs atomically regardless
    // of file permissions): /dev/shm is reliably a separate mount from the
    // default temp directory, so moving into it is cross-device.
    let purge = tempfile::Builder::new().tempdir_in("/dev/shm").unwrap();

    let old1 = b"old-one";
    let old2 = b"old-two";
    let old3 = b"old-three";
    let old_hash1 = Sha256Hex::digest(old1);
    let old_hash2 = Sha256Hex::digest(old2);
    let old_hash3 = Sha256Hex::digest(old3);
    let old_index = format!(
        r#"{{"Name":"Test","Version":"1.0.0","Published":"2024-01-01T00:00:00Z","Artifacts":[
        {{"Filename":"old1.bin","SHA256":"{old_hash1}","URLs":["https://x/old1.bin"]}},
        {{"Filename":"old2.bin","SHA256":"{old_hash2}","URLs":["https://x/old2.bin"]}},
        {{"Filename":"old3.bin","SHA256":"{old_hash3}","URLs":["https://x/old3.bin"]}}]}}"#,
    );
    std::fs::write(active.path().join("index.json"), &old_index).unwrap();
    std::fs::write(active.path().join("old1.bin"), old1).unwrap();
    std::fs::write(active.path().join("old2.bin"), old2).unwrap();
    std::fs::write(active.path().join("old3.bin"), old3).unwrap();

    let mut cfg = config(active.path(), staging.path(), purge.path());
    let updater = bundle_core::Updater::new(cfg.clone(), Arc::new(NullNotifier));
    assert!(!updater.is_corrupted());
    let old_index_snapshot = updater.get_index();

    // Only now, after the startup integrity check has already verified the
    // file, strip read permission so its step-1 copy (not its rename, which
    // the kernel would perform regardless of permissions) fails.
    let old3_path = active.path().join("old3.bin");
    std::fs::set_permissions(&old3_path, std::fs::Permissions::from_mode(0o000)).unwrap();

    let mut server = mockito::Server::new_async().await;
    let new_hash = Sha256Hex::of_empty();
    let new_index = format!(
        r#"{{"Name":"Test","Version":"1.0.1","Published":"2024-02-01T00:00:00Z","Artifacts":[
        {{"Filename":"new1.bin","SHA256":"{new_hash}","URLs":["{url}/new1.bin"]}},
        {{"Filename":"new2.bin","SHA256":"{new_hash}","URLs":["{url}/new2.bin"]}},
        {{"Filename":"new3.bin","SHA256":"{new_hash}","URLs":["{url}/new3.bin"]}}]}}"#,
        url = server.url(),
    );
    let _idx = serve_index(&mut server, &new_index).await;
    for name in ["new1.bin", "new2.bin", "new3.bin"] {
        server
            .mock("GET", format!("/{name}").as_str())
            .with_status(200)
            .with_body(b"".to_vec())
            .create_async()
            .await;
    }
    cfg.index_urls = vec![format!("{}/index.json", server.url())];
    // configure() while already started performs an internal stop-then-start
    // cycle; exercise that lifecycle here rather than just swapping in the
    // new mirror list directly.
    updater.start();
    updater.configure(false, cfg.index_urls.clone());

    let err = updater.force_update().await.unwrap_err();
    assert!(matches!(err, UpdaterError::SwapFailed(_)));

    // The permission bit was only the test's trigger for the crash, not
    // part of the crash's aftermath: a real interrupted swap leaves files
    // exactly as they were, still readable.
    std::fs::set_permissions(&old3_path, std::fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(std::fs::read(active.path().join("old1.bin")).unwrap(), old1);
    assert_eq!(std::fs::read(active.path().join("old2.bin")).unwrap(), old2);
    assert_eq!(std::fs::read(&old3_path).unwrap(), old3);
    assert!(active.path().join("index.json").exists());
    assert!(!active.path().join("new1.bin").exists());

    let rolled_back_index = Index::parse(old_index.as_bytes(), None, &Platform::cross_platform(), 900).unwrap();
    verify_artifacts(active.path(), &rolled_back_index).unwrap();

    assert_eq!(updater.get_index().version, old_index_snapshot.version);
    assert_eq!(updater.get_index().artifacts.len(), old_index_snapshot.artifacts.len());
}

#[tokio::test]
async fn artifact_reuse_skips_network_fetch() {
    let active = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let purge = tempfile::tempdir().unwrap();

    std::fs::write(active.path().join("a.bin"), b"unchanged").unwrap();
    let reused_hash = Sha256Hex::digest(b"unchanged");

    let mut server = mockito::Server::new_async().await;
    let json = format!(
        r#"{{"Name":"Test","Version":"1.0.1","Published":"2024-02-01T00:00:00Z",
        "Artifacts":[{{"Filename":"a.bin","SHA256":"{reused_hash}","URLs":["{url}/must-not-be-called"]}}]}}"#,
        url = server.url(),
    );
    let _idx = serve_index(&mut server, &json).await;
    // Deliberately no mock for /must-not-be-called: a GET there would fail
    // the test via mockito's unmatched-request behavior being surfaced as
    // a download error, which the assertion below would catch.

    let mut cfg = config(active.path(), staging.path(), purge.path());
    cfg.index_urls = vec![format!("{}/index.json", server.url())];
    let updater = bundle_core::Updater::new(cfg, Arc::new(NullNotifier));

    updater.force_update().await.unwrap();
    assert_eq!(std::fs::read(active.path().join("a.bin")).unwrap(), b"unchanged");
}
