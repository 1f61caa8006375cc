use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Once,
    time::Duration,
};

use tails_file_service::{
    server::{spawn_tails_server, TailsServerHandle, TailsStore},
    tails_hash, RetryPolicy, TailsFileDistributor, TailsFileError,
};
use tempfile::TempDir;
use url::Url;

static LOGGING_INIT: Once = Once::new();

fn setup_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    let _ = env_logger::Builder::from_env(env).is_test(true).try_init();
}

fn localhost() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}

async fn start_server() -> (TempDir, TailsServerHandle) {
    LOGGING_INIT.call_once(setup_logging);
    let server_dir = tempfile::tempdir().unwrap();
    let store = TailsStore::new(server_dir.path()).unwrap();
    let server = spawn_tails_server(localhost(), store).await.unwrap();
    (server_dir, server)
}

fn write_tails_file(dir: &TempDir, content: &[u8]) -> (PathBuf, String) {
    let hash = tails_hash(content);
    let path = dir.path().join(&hash);
    std::fs::write(&path, content).unwrap();
    (path, hash)
}

async fn download(url: &Url) -> (u16, Vec<u8>) {
    let response = reqwest::get(url.clone()).await.unwrap();
    let status = response.status().as_u16();
    (status, response.bytes().await.unwrap().to_vec())
}

#[tokio::test]
async fn test_upload_returns_content_addressed_url() {
    let (_server_dir, server) = start_server().await;
    let local_dir = tempfile::tempdir().unwrap();
    let (path, hash) = write_tails_file(&local_dir, &[0, 2, 7, 7, 7, 1, 9]);

    let url = TailsFileDistributor::default()
        .upload(&path, &hash, server.base_url())
        .await
        .unwrap();

    assert_eq!(url.as_str(), format!("{}{}", server.base_url(), hash));
    let (status, body) = download(&url).await;
    assert_eq!(status, 200);
    assert_eq!(body, vec![0, 2, 7, 7, 7, 1, 9]);
    server.shutdown();
}

#[tokio::test]
async fn test_reupload_is_idempotent_and_isolated() {
    let (_server_dir, server) = start_server().await;
    let local_dir = tempfile::tempdir().unwrap();
    let (path_a, hash_a) = write_tails_file(&local_dir, b"accumulator a");
    let (path_b, hash_b) = write_tails_file(&local_dir, b"accumulator b");
    let distributor = TailsFileDistributor::default();

    let url_b = distributor
        .upload(&path_b, &hash_b, server.base_url())
        .await
        .unwrap();
    let first = distributor
        .upload(&path_a, &hash_a, server.base_url())
        .await
        .unwrap();
    let second = distributor
        .upload(&path_a, &hash_a, server.base_url())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_ne!(first, url_b);
    assert_eq!(download(&first).await.1, b"accumulator a".to_vec());
    assert_eq!(download(&url_b).await.1, b"accumulator b".to_vec());
    server.shutdown();
}

#[tokio::test]
async fn test_hash_mismatch_is_rejected_with_body() {
    let (_server_dir, server) = start_server().await;
    let local_dir = tempfile::tempdir().unwrap();
    let (path, _) = write_tails_file(&local_dir, b"real content");
    let wrong_hash = tails_hash(b"other content");

    let err = TailsFileDistributor::default()
        .upload(&path, &wrong_hash, server.base_url())
        .await
        .unwrap_err();

    match err {
        TailsFileError::Rejected { status, ref body } => {
            assert_eq!(status, 400);
            assert!(body.contains("does not match"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(!err.is_transient());
    let missing = server.base_url().join(&wrong_hash).unwrap();
    assert_eq!(download(&missing).await.0, 404);
    server.shutdown();
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    LOGGING_INIT.call_once(setup_logging);
    let listener = std::net::TcpListener::bind(localhost()).unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let base_url = Url::parse(&format!("http://{addr}")).unwrap();

    let local_dir = tempfile::tempdir().unwrap();
    let (path, hash) = write_tails_file(&local_dir, b"unreachable");
    let distributor = TailsFileDistributor::new(RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(10),
    });

    let err = distributor.upload(&path, &hash, &base_url).await.unwrap_err();
    assert!(err.is_transient(), "unexpected error {err:?}");
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn test_missing_local_file_is_io_error() {
    let (_server_dir, server) = start_server().await;
    let local_dir = tempfile::tempdir().unwrap();
    let path = local_dir.path().join("does-not-exist");

    let err = TailsFileDistributor::default()
        .upload(&path, &tails_hash(b"x"), server.base_url())
        .await
        .unwrap_err();
    assert!(matches!(err, TailsFileError::Io { .. }));
    server.shutdown();
}
