mod support;

use std::sync::Arc;

use s3ftps::{EngineOptions, ErrorKind, MemoryStore, Request, SyncEngine, SyncError};
use support::{get_request, FakeRemote};

fn engine(remote: &FakeRemote, store: &Arc<MemoryStore>, options: EngineOptions) -> SyncEngine {
    SyncEngine::new(Arc::new(remote.clone()), store.clone(), options)
}

fn drop_dir() -> FakeRemote {
    let remote = FakeRemote::new();
    remote.mkdir("/drop");
    remote.mkdir("/drop/archive");
    remote.add_file("/drop/a.txt", b"alpha");
    remote.add_file("/drop/b.txt", b"bravo");
    remote.add_file("/drop/archive/old.txt", b"old");
    remote
}

#[tokio::test]
async fn pulls_files_and_ignores_directories() -> Result<(), SyncError> {
    let remote = drop_dir();
    let store = Arc::new(MemoryStore::new());
    let request = Request::try_from(get_request("/drop"))?;

    let report = engine(&remote, &store, EngineOptions::default())
        .run(&request)
        .await?;

    assert_eq!(report.succeeded, vec!["a.txt", "b.txt"]);
    assert!(report.failed.is_empty());
    assert_eq!(store.keys("B"), vec!["/drop/a.txt", "/drop/b.txt"]);
    assert_eq!(store.get("B", "/drop/a.txt").unwrap(), b"alpha");

    let reads = remote.state.lock().reads.clone();
    assert!(!reads.iter().any(|r| r.contains("archive")));
    // remote files stay where they were
    assert!(remote.file("/drop/a.txt").is_some());
    assert_eq!((remote.opened(), remote.closed()), (1, 1));
    Ok(())
}

#[tokio::test]
async fn second_run_writes_nothing_new() -> Result<(), SyncError> {
    let remote = drop_dir();
    let store = Arc::new(MemoryStore::new());
    let request = Request::try_from(get_request("/drop"))?;
    let engine = engine(&remote, &store, EngineOptions::default());

    engine.run(&request).await?;
    remote.add_file("/drop/a.txt", b"changed");
    let second = engine.run(&request).await?;

    assert!(second.succeeded.is_empty());
    assert_eq!(second.skipped, vec!["a.txt", "b.txt"]);
    assert_eq!(store.keys("B").len(), 2);
    assert_eq!(store.get("B", "/drop/a.txt").unwrap(), b"alpha");
    Ok(())
}

#[tokio::test]
async fn empty_directory_is_a_successful_no_op() -> Result<(), SyncError> {
    let remote = FakeRemote::new();
    remote.mkdir("/drop");
    let store = Arc::new(MemoryStore::new());
    let request = Request::try_from(get_request("/drop"))?;

    let report = engine(&remote, &store, EngineOptions::default())
        .run(&request)
        .await?;

    assert!(report.is_clean());
    assert!(report.succeeded.is_empty());
    assert!(store.keys("B").is_empty());
    assert_eq!(remote.closed(), 1);
    Ok(())
}

#[tokio::test]
async fn one_bad_file_does_not_block_the_rest() -> Result<(), SyncError> {
    let remote = drop_dir();
    remote.state.lock().fail_reads.insert("a.txt".into());
    let store = Arc::new(MemoryStore::new());
    let request = Request::try_from(get_request("/drop"))?;

    let report = engine(&remote, &store, EngineOptions::default())
        .run(&request)
        .await?;

    assert_eq!(report.succeeded, vec!["b.txt"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].item, "a.txt");
    assert_eq!(report.failed[0].kind, ErrorKind::Transfer);
    assert_eq!(store.keys("B"), vec!["/drop/b.txt"]);
    Ok(())
}

#[tokio::test]
async fn missing_directory_aborts_and_still_closes() -> Result<(), SyncError> {
    let remote = FakeRemote::new();
    let store = Arc::new(MemoryStore::new());
    let request = Request::try_from(get_request("/nowhere"))?;

    let err = engine(&remote, &store, EngineOptions::default())
        .run(&request)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Path);
    assert_eq!((remote.opened(), remote.closed()), (1, 1));
    Ok(())
}

#[tokio::test]
async fn remote_delete_only_when_enabled() -> Result<(), SyncError> {
    let remote = drop_dir();
    let store = Arc::new(MemoryStore::new());
    store.insert("B", "/drop/b.txt", b"bravo".to_vec());
    let request = Request::try_from(get_request("/drop"))?;

    let options = EngineOptions {
        delete_remote_after_get: true,
    };
    let report = engine(&remote, &store, options).run(&request).await?;

    assert_eq!(report.succeeded, vec!["a.txt"]);
    assert_eq!(report.skipped, vec!["b.txt"]);
    // only files actually written to the store are removed
    assert!(remote.file("/drop/a.txt").is_none());
    assert!(remote.file("/drop/b.txt").is_some());
    assert_eq!(remote.state.lock().removed, vec!["/drop/a.txt"]);
    Ok(())
}

#[tokio::test]
async fn refused_connection_fails_the_flow() -> Result<(), SyncError> {
    let remote = drop_dir();
    remote.state.lock().refuse_connections = true;
    let store = Arc::new(MemoryStore::new());
    let request = Request::try_from(get_request("/drop"))?;

    let err = engine(&remote, &store, EngineOptions::default())
        .run(&request)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connect);
    assert!(store.keys("B").is_empty());
    Ok(())
}
