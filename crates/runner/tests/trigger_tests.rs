//! HTTP trigger behaviour against a mock server.

use std::collections::BTreeMap;
use std::time::Duration;

use e2e_verify_runner::{Error, HttpTrigger, Trigger};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INTERVAL: Duration = Duration::from_millis(20);

fn trigger(server: &MockServer, times: u32) -> HttpTrigger {
    let headers = BTreeMap::from([("X-E2E".to_string(), "yes".to_string())]);
    HttpTrigger::new(INTERVAL, times, &format!("{}/users", server.uri()), "post", "{}", &headers).unwrap()
}

#[tokio::test]
async fn test_completes_on_first_ok() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("X-E2E", "yes"))
        .and(body_string("{}"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let trigger = trigger(&server, 5);
    trigger.start().await.unwrap().unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_gives_up_after_times_with_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let trigger = trigger(&server, 3);
    let err = trigger.start().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::TriggerStatus { status: 502, .. }), "{err}");
    server.verify().await;
}

#[tokio::test]
async fn test_retries_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(2)
        .mount(&server)
        .await;

    trigger(&server, 0).start().await.unwrap().unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_stop_completes_pending_start() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let trigger = trigger(&server, 0);
    let outcome = trigger.start();
    tokio::time::sleep(INTERVAL * 3).await;
    trigger.stop();

    let result = tokio::time::timeout(Duration::from_secs(5), outcome).await.unwrap().unwrap();
    assert!(result.is_ok());
}
