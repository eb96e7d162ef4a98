use std::fs;
use std::sync::Arc;

use camino::Utf8PathBuf;
use tempfile::tempdir;
use tokio::sync::Semaphore;

use wm_core::{Config, LogStatus, ScanSettings, ScanTrigger, StorageConfig, Truncation};
use wm_scanner::{
    ClientError, Credentials, LocalMountConnector, MemoryDav, ScanOrchestrator, ScanOutcome,
    ScanRequest,
};

const URL: &str = "https://dav.example";
const USER: &str = "alice";

fn credentials() -> Credentials {
    Credentials::new(URL, USER, "secret")
}

/// Five media files spread over three directories, plus noise.
///
///   /photos/
///     a.jpg  b.png  notes.txt
///     2024/
///       d.mp4  raw.cr2
///       trip/
///         e.mov  f.JPEG
fn five_file_tree() -> MemoryDav {
    let dav = MemoryDav::new();
    dav.add_file("/photos/a.jpg", 100);
    dav.add_file("/photos/b.png", 200);
    dav.add_file("/photos/notes.txt", 10);
    dav.add_file("/photos/2024/d.mp4", 400);
    dav.add_file("/photos/2024/raw.cr2", 300);
    dav.add_file("/photos/2024/trip/e.mov", 450);
    dav.add_file("/photos/2024/trip/f.JPEG", 500);
    dav
}

fn result_of(outcome: &ScanOutcome) -> &wm_core::ScanResult {
    outcome.result().unwrap()
}

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    let dav = five_file_tree();
    let service = ScanOrchestrator::in_memory(dav.clone());

    let first = service
        .run_scan(ScanRequest::new(credentials(), "/photos"))
        .await
        .unwrap();
    assert!(matches!(first, ScanOutcome::Completed { .. }));
    assert_eq!(result_of(&first).total_files, 5);
    let logged = service.logs(URL, USER, "/photos", 100).unwrap().len();

    dav.reset_list_calls();
    let second = service
        .run_scan(ScanRequest::new(credentials(), "/photos"))
        .await
        .unwrap();

    let ScanOutcome::Cached { entry, from_cache } = &second else {
        panic!("expected a cache hit, got {second:?}");
    };
    assert!(*from_cache);
    assert_eq!(entry.result.total_files, 5);
    assert_eq!(dav.list_calls(), 0);
    assert_eq!(service.logs(URL, USER, "/photos", 100).unwrap().len(), logged);
    assert_eq!(service.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_forced_rescan_replaces_cached_result() {
    let dav = five_file_tree();
    let service = ScanOrchestrator::in_memory(dav.clone());

    service
        .run_scan(ScanRequest::new(credentials(), "/photos"))
        .await
        .unwrap();

    dav.add_file("/photos/g.gif", 1);
    dav.add_file("/photos/2024/trip/h.webm", 1);

    let stale = service
        .run_scan(ScanRequest::new(credentials(), "/photos"))
        .await
        .unwrap();
    assert!(stale.is_cached());
    assert_eq!(result_of(&stale).total_files, 5);

    let fresh = service
        .run_scan(ScanRequest::new(credentials(), "/photos").forced())
        .await
        .unwrap();
    assert!(matches!(fresh, ScanOutcome::Completed { .. }));
    assert_eq!(result_of(&fresh).total_files, 7);

    let cached = service.peek(&credentials(), "/photos").entry.unwrap();
    assert_eq!(cached.result.total_files, 7);
    assert_eq!(cached.result.files.len(), 7);

    let logs = service.logs(URL, USER, "/photos", 1).unwrap();
    assert_eq!(logs[0].scan_type, ScanTrigger::Forced);
    assert_eq!(logs[0].total_files, Some(7));
}

#[tokio::test]
async fn test_failed_forced_rescan_leaves_cache_empty() {
    let dav = five_file_tree();
    let service = ScanOrchestrator::in_memory(dav.clone());
    service
        .run_scan(ScanRequest::new(credentials(), "/photos"))
        .await
        .unwrap();
    assert!(service.peek(&credentials(), "/photos").entry.is_some());

    dav.fail("/photos", |_| ClientError::Unauthorized);
    let err = service
        .run_scan(ScanRequest::new(credentials(), "/photos").forced())
        .await
        .unwrap_err();
    assert!(err.is_remote());

    assert!(service.peek(&credentials(), "/photos").entry.is_none());
    let logs = service.logs(URL, USER, "/photos", 1).unwrap();
    assert_eq!(logs[0].status, LogStatus::Failed);
    assert_eq!(logs[0].scan_type, ScanTrigger::Forced);

    // Nothing stale to fall back on
    dav.heal("/photos");
    let outcome = service
        .run_scan(ScanRequest::new(credentials(), "/photos"))
        .await
        .unwrap();
    assert!(matches!(outcome, ScanOutcome::Completed { .. }));
}

#[tokio::test]
async fn test_forced_request_joining_running_task_keeps_cache() {
    let dav = five_file_tree();
    let service = ScanOrchestrator::in_memory(dav.clone());
    service
        .run_scan(ScanRequest::new(credentials(), "/photos"))
        .await
        .unwrap();

    let running = service.registry().start_task(URL, USER, ["/photos"]);
    dav.reset_list_calls();
    let outcome = service
        .run_scan(ScanRequest::new(credentials(), "/photos").forced())
        .await
        .unwrap();

    assert_eq!(outcome, ScanOutcome::AlreadyRunning { task_id: running });
    let cached = service.peek(&credentials(), "/photos").entry.unwrap();
    assert_eq!(cached.result.total_files, 5);
    assert_eq!(dav.list_calls(), 0);
}

#[tokio::test]
async fn test_concurrent_duplicate_joins_running_task() {
    let dav = five_file_tree();
    let gate = Arc::new(Semaphore::new(0));
    dav.set_gate(Arc::clone(&gate));
    let service = ScanOrchestrator::in_memory(dav.clone());

    let first = tokio::spawn({
        let service = service.clone();
        async move {
            service
                .run_scan(ScanRequest::new(credentials(), "/photos"))
                .await
        }
    });

    for _ in 0..100 {
        if service.registry().is_task_running(URL, USER, ["/photos"]) {
            break;
        }
        tokio::task::yield_now().await;
    }
    let running = service
        .registry()
        .get_running_task(URL, USER, ["/photos"])
        .unwrap();

    let second = service
        .run_scan(ScanRequest::new(credentials(), "/photos"))
        .await
        .unwrap();
    assert_eq!(
        second,
        ScanOutcome::AlreadyRunning {
            task_id: running.task_id.clone()
        }
    );
    let peek = service.peek(&credentials(), "/photos");
    assert!(peek.entry.is_none());
    assert_eq!(peek.running_task.unwrap().task_id, running.task_id);

    gate.add_permits(1);
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.task_id(), Some(running.task_id.as_str()));
    assert_eq!(result_of(&first).total_files, 5);

    let stats = service.stats();
    assert_eq!(stats.started, 1);
    assert_eq!(stats.joined, 1);
    assert!(!service.registry().is_task_running(URL, USER, ["/photos"]));
}

#[tokio::test]
async fn test_rescan_of_unchanged_tree_is_idempotent() {
    let dav = five_file_tree();
    let service = ScanOrchestrator::in_memory(dav);

    let mut counts = Vec::new();
    for _ in 0..3 {
        let outcome = service
            .run_scan(ScanRequest::new(credentials(), "/photos").forced())
            .await
            .unwrap();
        let result = result_of(&outcome);
        assert_eq!(result.recount(), (result.image_count, result.video_count));
        assert!(result.image_count + result.video_count <= result.total_files);
        counts.push((result.total_files, result.image_count, result.video_count));
    }

    assert_eq!(counts, [(5, 3, 2), (5, 3, 2), (5, 3, 2)]);
}

#[tokio::test]
async fn test_max_files_is_never_exceeded() {
    let dav = MemoryDav::new();
    for dir in 0..5 {
        for file in 0..10 {
            dav.add_file(&format!("/big/{dir}/{file}.jpg"), 1);
        }
    }
    let service = ScanOrchestrator::in_memory(dav);
    let settings = ScanSettings {
        max_files: 7,
        batch_size: 3,
        ..ScanSettings::default()
    };

    let outcome = service
        .run_scan(ScanRequest::new(credentials(), "/big").with_settings(settings))
        .await
        .unwrap();
    let result = result_of(&outcome);

    assert_eq!(result.total_files, 7);
    assert_eq!(result.files.len(), 7);
    assert_eq!(result.truncated, Some(Truncation::MaxFiles));

    let cached = service.peek(&credentials(), "/big").entry.unwrap();
    assert_eq!(cached.settings.max_files, 7);
    assert!(service.cache_summary(URL, USER)["/big"].truncated);
}

#[tokio::test]
async fn test_max_depth_zero_scans_only_root() {
    let dav = five_file_tree();
    let service = ScanOrchestrator::in_memory(dav);
    let settings = ScanSettings {
        max_depth: 0,
        ..ScanSettings::default()
    };

    let outcome = service
        .run_scan(ScanRequest::new(credentials(), "/photos").with_settings(settings))
        .await
        .unwrap();
    let result = result_of(&outcome);

    assert_eq!(result.total_files, 2);
    assert_eq!(result.scanned_directories, 1);
    assert!(result.files.iter().all(|f| f.full_path.matches('/').count() == 2));
}

#[tokio::test]
async fn test_persistent_stores_survive_restart() {
    let tmp = tempdir().unwrap();
    let config = Config {
        storage: StorageConfig {
            data_dir: Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap(),
        },
        ..Config::default()
    };

    let dav = five_file_tree();
    {
        let service = ScanOrchestrator::from_config(dav.clone(), &config).unwrap();
        service
            .run_scan(ScanRequest::new(credentials(), "/photos"))
            .await
            .unwrap();
    }

    dav.reset_list_calls();
    let restarted = ScanOrchestrator::from_config(dav.clone(), &config).unwrap();
    let outcome = restarted
        .run_scan(ScanRequest::new(credentials(), "/photos"))
        .await
        .unwrap();

    assert!(outcome.is_cached());
    assert_eq!(dav.list_calls(), 0);
    assert_eq!(restarted.logs(URL, USER, "/photos", 10).unwrap().len(), 2);
}

#[tokio::test]
async fn test_scan_through_local_mount() {
    let tmp = tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
    fs::create_dir_all(root.join("media/clips")).unwrap();
    fs::write(root.join("media/cover.jpg"), b"jpg").unwrap();
    fs::write(root.join("media/readme.md"), b"text").unwrap();
    fs::write(root.join("media/clips/intro.mp4"), b"mp4!").unwrap();

    let mut connector = LocalMountConnector::new();
    connector.add_mount(URL, root);
    let service = ScanOrchestrator::in_memory(connector);

    let outcome = service
        .run_scan(ScanRequest::new(credentials(), "/media"))
        .await
        .unwrap();
    let result = result_of(&outcome);

    assert_eq!(result.total_files, 2);
    assert_eq!(result.image_count, 1);
    assert_eq!(result.video_count, 1);
    let video = result.files.iter().find(|f| f.is_video()).unwrap();
    assert_eq!(video.full_path, "/media/clips/intro.mp4");
    assert_eq!(video.size_bytes, 4);
}

#[tokio::test]
async fn test_unknown_server_fails_to_connect() {
    let service = ScanOrchestrator::in_memory(LocalMountConnector::new());

    let err = service
        .run_scan(ScanRequest::new(credentials(), "/media"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed to connect"));
    assert_eq!(service.stats().failed, 1);
}
