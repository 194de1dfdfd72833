//! Retry and backoff behaviour against a scripted upstream.

mod common;

use std::time::{Duration, Instant};

use common::{refused_url, MockUpstream, Step};
use http::{Method, StatusCode};
use resilient_client::config::TimeoutConfig;
use resilient_client::http::StatusMatch;
use resilient_client::{
    CallPolicy, Client, Failure, FailoverRules, OutcomeMatch, PolicyError, RequestDescriptor, RetryPolicy,
    StatusRule,
};

fn client() -> Client {
    Client::builder().build().unwrap()
}

fn policy(retry: RetryPolicy) -> CallPolicy {
    CallPolicy::new().retry(retry)
}

#[tokio::test]
async fn test_max_attempts_recovers_after_dropped_connections() {
    let upstream = MockUpstream::start(vec![Step::Close, Step::Close, Step::Close, Step::ok("hello")]).await;
    let request = RequestDescriptor::get(&upstream.url("/greeting")).unwrap();

    let reply = client()
        .execute_with(&request, &policy(RetryPolicy::max_attempts(3)))
        .await
        .unwrap();

    assert_eq!(reply.text(), "hello");
    assert_eq!(upstream.hits(), 4);
}

#[tokio::test]
async fn test_max_attempts_recovers_after_unanswered_requests() {
    let upstream = MockUpstream::start(vec![Step::Hang, Step::Hang, Step::Hang, Step::ok("hello")]).await;
    let request = RequestDescriptor::get(&upstream.url("/greeting")).unwrap();
    let policy = CallPolicy::new()
        .timeouts(TimeoutConfig::unbounded().with_response(Duration::from_millis(100)))
        .retry(RetryPolicy::max_attempts(3));

    let started = Instant::now();
    let reply = client().execute_with(&request, &policy).await.unwrap();

    assert_eq!(reply.text(), "hello");
    assert_eq!(upstream.hits(), 4);
    // Each timed-out connection is discarded, so every attempt dials again.
    assert_eq!(upstream.connections(), 4);
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_unbounded_jitter_factor_still_backs_off() {
    let url = refused_url().await;
    let request = RequestDescriptor::get(&url).unwrap();
    let retry = RetryPolicy::exponential_jitter(2, Duration::from_millis(10), f64::INFINITY);

    let started = Instant::now();
    let err = client().execute_with(&request, &policy(retry)).await.unwrap_err();

    assert_eq!(err.transport_kind(), Some(resilient_client::TransportKind::ConnectionRefused));
    // 10ms + 20ms of base delay, at most doubled by jitter.
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn test_server_errors_retried_until_success() {
    let upstream = MockUpstream::start(vec![Step::status(500), Step::status(500), Step::ok("hello")]).await;
    let request = RequestDescriptor::get(&upstream.url("/")).unwrap();
    let retry = RetryPolicy::max_attempts(5).retry_on(vec![OutcomeMatch::ServerError]);

    let reply = client().execute_with(&request, &policy(retry)).await.unwrap();

    assert_eq!(reply.text(), "hello");
    assert_eq!(reply.status(), Some(StatusCode::OK));
    assert_eq!(upstream.hits(), 3);
}

#[tokio::test]
async fn test_client_error_not_retried_by_default() {
    let upstream = MockUpstream::start(vec![Step::status(400), Step::ok("never")]).await;
    let request = RequestDescriptor::get(&upstream.url("/")).unwrap();

    let err = client().call(&request).await.unwrap_err();

    match err {
        Failure::ClientError { status, .. } => assert_eq!(status, StatusCode::BAD_REQUEST),
        other => panic!("expected client error, got {other:?}"),
    }
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn test_client_error_retried_when_listed() {
    let upstream = MockUpstream::start(vec![Step::status(429), Step::ok("hello")]).await;
    let request = RequestDescriptor::get(&upstream.url("/")).unwrap();
    let retry = RetryPolicy::max_attempts(2).also_retry(OutcomeMatch::Status(429));

    let reply = client().execute_with(&request, &policy(retry)).await.unwrap();

    assert_eq!(reply.text(), "hello");
    assert_eq!(upstream.hits(), 2);
}

#[tokio::test]
async fn test_exhausted_server_errors_propagate_last_failure() {
    let upstream = MockUpstream::start(vec![Step::status(500), Step::status(502), Step::status(503)]).await;
    let request = RequestDescriptor::get(&upstream.url("/")).unwrap();

    let err = client()
        .execute_with(&request, &policy(RetryPolicy::max_attempts(2)))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert!(matches!(err, Failure::ServerError { .. }));
    assert_eq!(upstream.hits(), 3);
}

#[tokio::test]
async fn test_exponential_backoff_waits_between_attempts() {
    let upstream = MockUpstream::start(vec![Step::status(500), Step::status(500), Step::ok("hello")]).await;
    let request = RequestDescriptor::get(&upstream.url("/")).unwrap();
    let retry = RetryPolicy::exponential(2, Duration::from_millis(50));

    let started = Instant::now();
    let reply = client().execute_with(&request, &policy(retry)).await.unwrap();

    assert_eq!(reply.text(), "hello");
    // 50ms before the second attempt, 100ms before the third.
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(upstream.hits(), 3);
}

#[tokio::test]
async fn test_non_retry_safe_post_fails_with_policy_error() {
    let upstream = MockUpstream::start(vec![Step::status(500), Step::ok("hello")]).await;
    let request = RequestDescriptor::builder(Method::POST, &upstream.url("/orders"))
        .body("{}")
        .build()
        .unwrap();
    assert!(!request.is_retry_safe());

    let err = client()
        .execute_with(&request, &policy(RetryPolicy::max_attempts(3)))
        .await
        .unwrap_err();

    match &err {
        Failure::Policy(PolicyError::NotRetrySafe { method, cause }) => {
            assert_eq!(*method, Method::POST);
            assert!(matches!(**cause, Failure::ServerError { .. }));
        }
        other => panic!("expected policy error, got {other:?}"),
    }
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn test_post_marked_retry_safe_is_retried() {
    let upstream = MockUpstream::start(vec![Step::status(500), Step::ok("created")]).await;
    let request = RequestDescriptor::builder(Method::POST, &upstream.url("/orders"))
        .body("{}")
        .retry_safe(true)
        .build()
        .unwrap();

    let reply = client()
        .execute_with(&request, &policy(RetryPolicy::max_attempts(1)))
        .await
        .unwrap();

    assert_eq!(reply.text(), "created");
    assert_eq!(upstream.hits(), 2);
}

#[tokio::test]
async fn test_flagged_status_retried_by_label() {
    let upstream = MockUpstream::start(vec![Step::status(503), Step::status(503), Step::ok("hello")]).await;
    let request = RequestDescriptor::get(&upstream.url("/")).unwrap();
    let policy = CallPolicy::new()
        .status_rules(vec![StatusRule::new(StatusMatch::ServerError, "overloaded")])
        .retry(RetryPolicy::max_attempts(3).retry_on(vec![OutcomeMatch::Flagged("overloaded".into())]));

    let reply = client().execute_with(&request, &policy).await.unwrap();

    assert_eq!(reply.text(), "hello");
    assert_eq!(upstream.hits(), 3);
}

#[tokio::test]
async fn test_flagged_status_not_retried_unless_listed() {
    let upstream = MockUpstream::start(vec![Step::status(503), Step::ok("hello")]).await;
    let request = RequestDescriptor::get(&upstream.url("/")).unwrap();
    let policy = CallPolicy::new()
        .status_rules(vec![StatusRule::new(StatusMatch::Status(503), "overloaded")])
        .retry(RetryPolicy::max_attempts(3));

    let err = client().execute_with(&request, &policy).await.unwrap_err();

    match err {
        Failure::Flagged { label, status, .. } => {
            assert_eq!(label, "overloaded");
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        }
        other => panic!("expected flagged failure, got {other:?}"),
    }
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn test_execute_uses_client_status_rules() {
    let upstream = MockUpstream::start(vec![Step::status(404)]).await;
    let request = RequestDescriptor::get(&upstream.url("/missing")).unwrap();
    let client = Client::builder()
        .status_rules(vec![StatusRule::new(StatusMatch::Status(404), "not_found")])
        .build()
        .unwrap();

    let err = client
        .execute(&request, TimeoutConfig::default(), RetryPolicy::none(), FailoverRules::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Failure::Flagged { ref label, .. } if label == "not_found"));
}

#[tokio::test]
async fn test_call_id_header_sent_and_preserved() {
    let upstream = MockUpstream::start(vec![Step::ok("a"), Step::ok("b")]).await;
    let client = client();

    let generated = RequestDescriptor::get(&upstream.url("/")).unwrap();
    client.call(&generated).await.unwrap();

    let supplied = RequestDescriptor::builder(Method::GET, &upstream.url("/"))
        .header("x-request-id", "caller-chosen")
        .build()
        .unwrap();
    client.call(&supplied).await.unwrap();

    let requests = upstream.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].contains("x-request-id: "));
    assert!(requests[1].contains("x-request-id: caller-chosen"));
    assert!(requests[0].contains("host: 127.0.0.1:"));
}
