//! Downloader behavior against a mock artifact store

use std::time::Duration;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};
use zoo_dispatcher::download::{DownloadOutcome, Downloader};

fn downloader(dir: &std::path::Path) -> Downloader {
    Downloader::new(dir, Duration::from_secs(1), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_download_writes_file_and_computes_digests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/artifact/1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let uri = format!("{}/artifact/1", server.uri());
    let outcome = downloader(dir.path()).download(&uri, &uri, "x.exe").await;

    match outcome {
        DownloadOutcome::Complete { path, digests } => {
            assert_eq!(path, dir.path().join("x.exe"));
            assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
            assert_eq!(digests.md5, "5eb63bbbe01eeed093cb22bb8f5acdc3");
            assert_eq!(digests.sha1, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
            assert_eq!(
                digests.sha256,
                "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
            );
        },
        DownloadOutcome::Failed { reason } => panic!("expected completion, got: {}", reason),
    }
}

#[tokio::test]
async fn test_download_fails_on_server_error_without_writing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/artifact/1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let uri = format!("{}/artifact/1", server.uri());
    let outcome = downloader(dir.path()).download(&uri, &uri, "x.exe").await;

    assert!(matches!(outcome, DownloadOutcome::Failed { .. }));
    assert!(!dir.path().join("x.exe").exists());
}

#[tokio::test]
async fn test_download_falls_back_to_secondary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/primary"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secondary"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mirror".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let outcome = downloader(dir.path())
        .download(
            &format!("{}/primary", server.uri()),
            &format!("{}/secondary", server.uri()),
            "x.exe",
        )
        .await;

    match outcome {
        DownloadOutcome::Complete { path, .. } => {
            assert_eq!(std::fs::read(path).unwrap(), b"mirror");
        },
        DownloadOutcome::Failed { reason } => panic!("expected fallback, got: {}", reason),
    }
}

#[tokio::test]
async fn test_download_reports_single_failure_when_both_uris_fail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/primary"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secondary"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let outcome = downloader(dir.path())
        .download(
            &format!("{}/primary", server.uri()),
            &format!("{}/secondary", server.uri()),
            "x.exe",
        )
        .await;

    match outcome {
        DownloadOutcome::Failed { reason } => {
            assert!(reason.contains("primary"));
            assert!(reason.contains("secondary"));
        },
        DownloadOutcome::Complete { .. } => panic!("expected failure"),
    }
    assert!(!dir.path().join("x.exe").exists());
}
