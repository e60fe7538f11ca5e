//! Work-task reply classification against a mock enricher

use std::time::Duration;
use uuid::Uuid;
use wiremock::{
    matchers::{method, path_regex},
    Mock, MockServer, ResponseTemplate,
};
use zoo_dispatcher::work::{WorkKind, WorkResult, WorkTask};

fn yara_task(endpoint: String) -> WorkTask {
    WorkTask {
        job_key: 1,
        artifact_id: Uuid::new_v4(),
        timeout: Duration::from_secs(5),
        kind: WorkKind::Yara,
        endpoint,
        arguments: vec![],
    }
}

async fn run_against(status: u16, body: Option<&str>) -> WorkResult {
    let server = MockServer::start().await;
    let mut template = ResponseTemplate::new(status);
    if let Some(body) = body {
        template = template.set_body_string(body);
    }
    Mock::given(method("GET"))
        .and(path_regex("^/yara/.+$"))
        .respond_with(template)
        .mount(&server)
        .await;

    let task = yara_task(format!("{}/yara/", server.uri()));
    task.run(&reqwest::Client::new()).await
}

#[tokio::test]
async fn test_http_200_is_success_with_body() {
    match run_against(200, Some("clean")).await {
        WorkResult::Success(success) => {
            assert_eq!(success.data, "clean");
            assert_eq!(success.kind, WorkKind::Yara);
            assert_eq!(success.routing_key, "yara.result.static.zoo");
        },
        WorkResult::Failure(failure) => panic!("expected success, got: {}", failure.data),
    }
}

#[tokio::test]
async fn test_http_404_is_already_deleted_failure() {
    match run_against(404, None).await {
        WorkResult::Failure(failure) => {
            assert_eq!(failure.data, "Not found (File already deleted?)");
        },
        WorkResult::Success(_) => panic!("expected failure"),
    }
}

#[tokio::test]
async fn test_http_500_names_the_failing_service() {
    match run_against(500, None).await {
        WorkResult::Failure(failure) => {
            assert_eq!(failure.data, "YARA service failed, check local logs");
        },
        WorkResult::Success(_) => panic!("expected failure"),
    }
}

#[tokio::test]
async fn test_other_status_is_reported_with_its_code() {
    match run_against(418, None).await {
        WorkResult::Failure(failure) => {
            assert_eq!(failure.data, "Some other code: 418");
        },
        WorkResult::Success(_) => panic!("expected failure"),
    }
}

#[tokio::test]
async fn test_transport_error_is_wildcard_failure() {
    // nothing listens on this port
    let task = yara_task("http://127.0.0.1:1/yara/".to_string());
    match task.run(&reqwest::Client::new()).await {
        WorkResult::Failure(failure) => {
            assert!(failure.data.starts_with("wildcard failure:"), "{}", failure.data);
        },
        WorkResult::Success(_) => panic!("expected failure"),
    }
}

#[tokio::test]
async fn test_task_timeout_is_wildcard_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/yara/.+$"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let mut task = yara_task(format!("{}/yara/", server.uri()));
    task.timeout = Duration::from_millis(100);

    match task.run(&reqwest::Client::new()).await {
        WorkResult::Failure(failure) => {
            assert!(failure.data.starts_with("wildcard failure:"), "{}", failure.data);
        },
        WorkResult::Success(_) => panic!("expected failure"),
    }
}
