use std::sync::Arc;
use tempfile::TempDir;
use wgdesk_common::{NativeKeyProvider, Snapshot};
use wgdesk_daemon::testing::{ScriptedRunner, SequentialKeyProvider};
use wgdesk_daemon::{DaemonConfig, DirStorage, FeatureConfig, PeerRegistry, StatusCollector};

fn config(dir: &TempDir) -> DaemonConfig {
    DaemonConfig {
        host: Some("vpn.example.com".to_string()),
        config_dir: dir.path().to_path_buf(),
        ..Default::default()
    }
}

fn registry(dir: &TempDir, runner: Arc<ScriptedRunner>) -> PeerRegistry {
    PeerRegistry::new(
        config(dir),
        Arc::new(DirStorage::new(dir.path())),
        runner,
        Arc::new(SequentialKeyProvider::new()),
    )
}

/// Full lifecycle against a real directory, then a restart from the persisted files.
#[tokio::test]
async fn registry_survives_restart() {
    let dir = TempDir::new().expect("tempdir");
    let runner = Arc::new(ScriptedRunner::new());
    let first = registry(&dir, runner.clone());

    let alice = first.create("alice", None).await.expect("create alice");
    let bob = first.create("bob", None).await.expect("create bob");
    first.disable(&bob.id).await.expect("disable bob");
    first.rename(&alice.id, "alice-laptop").await.expect("rename");

    let conf = std::fs::read_to_string(dir.path().join("wg0.conf")).expect("wg0.conf");
    assert!(conf.contains("ListenPort = 51820"));
    assert!(conf.contains("# Client: alice-laptop"));
    assert!(!conf.contains(&bob.public_key));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        for name in ["wg0.json", "wg0.conf"] {
            let mode = std::fs::metadata(dir.path().join(name))
                .expect("metadata")
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600, "{} must be private", name);
        }
    }

    let before = first.snapshot().await.expect("snapshot");

    // A new process reads the same files and brings the interface up again
    let runner = Arc::new(ScriptedRunner::new());
    let second = registry(&dir, runner.clone());
    let after = second.load().await.expect("reload");
    assert_eq!(*before, *after);
    assert_eq!(runner.count("wg-quick up"), 1);

    let carol = second.create("carol", None).await.expect("create carol");
    assert_eq!(carol.address.to_string(), "10.8.0.4");
}

#[tokio::test]
async fn backup_restores_into_fresh_directory() {
    let source_dir = TempDir::new().expect("tempdir");
    let source = registry(&source_dir, Arc::new(ScriptedRunner::new()));
    source.create("alice", None).await.expect("create");
    let backup = source.backup().await.expect("backup");

    let target_dir = TempDir::new().expect("tempdir");
    let target = registry(&target_dir, Arc::new(ScriptedRunner::new()));
    target.restore(&backup).await.expect("restore");

    let on_disk = std::fs::read_to_string(target_dir.path().join("wg0.json")).expect("wg0.json");
    let restored: Snapshot = serde_json::from_str(&on_disk).expect("parse");
    let original: Snapshot = serde_json::from_str(&backup).expect("parse");
    assert_eq!(restored, original);
}

#[tokio::test]
async fn one_time_link_expires_through_sweep() {
    let dir = TempDir::new().expect("tempdir");
    let runner = Arc::new(ScriptedRunner::new());
    let registry = Arc::new(PeerRegistry::new(
        config(&dir),
        Arc::new(DirStorage::new(dir.path())),
        runner.clone(),
        Arc::new(NativeKeyProvider),
    ));

    let peer = registry.create("phone", None).await.expect("create");
    let linked = registry.generate_one_time_link(&peer.id).await.expect("link");
    let expires = linked.one_time_link_expires_at.expect("expiry");

    let features = FeatureConfig {
        expiry: true,
        one_time_links: true,
    };
    let report = registry
        .sweep(expires + chrono::Duration::seconds(1), features)
        .await
        .expect("sweep");
    assert_eq!(report.links_cleared, vec![peer.id.clone()]);

    runner.respond("wg show", Ok(""));
    let clients = StatusCollector::new(registry.clone())
        .clients()
        .await
        .expect("status");
    assert_eq!(clients.len(), 1);
    assert!(clients[0].one_time_link.is_none());
    assert!(clients[0].one_time_link_expires_at.is_none());
}
