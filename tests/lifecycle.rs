//! Cancellation, shutdown and connection reuse across calls.

mod common;

use std::time::{Duration, Instant};

use common::{MockUpstream, Step};
use resilient_client::config::TimeoutConfig;
use resilient_client::{CallPolicy, Client, Failure, RequestDescriptor, RetryPolicy};

#[tokio::test]
async fn test_cancel_during_backoff_skips_remaining_attempts() {
    let upstream = MockUpstream::start(vec![Step::status(500), Step::ok("too late")]).await;
    let request = RequestDescriptor::get(&upstream.url("/")).unwrap();
    let policy = CallPolicy::new().retry(RetryPolicy::fixed_delay(5, Duration::from_secs(2)));
    let client = Client::builder().build().unwrap();

    let started = Instant::now();
    let err = client
        .execute_until(&request, &policy, tokio::time::sleep(Duration::from_millis(200)))
        .await
        .unwrap_err();

    assert!(matches!(err, Failure::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_call_and_later_calls() {
    let upstream = MockUpstream::start(vec![Step::Hang]).await;
    let request = RequestDescriptor::get(&upstream.url("/")).unwrap();
    let client = Client::builder().build().unwrap();

    let in_flight = {
        let client = client.clone();
        let request = request.clone();
        tokio::spawn(async move {
            let policy = CallPolicy::new().timeouts(TimeoutConfig::unbounded());
            client.execute_with(&request, &policy).await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(1), in_flight)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(Failure::Cancelled)));
    assert!(client.is_shutdown());

    let later = client.call(&request).await;
    assert!(matches!(later, Err(Failure::Cancelled)));
}

#[tokio::test]
async fn test_sequential_calls_reuse_one_connection() {
    let upstream = MockUpstream::start(vec![Step::ok("one"), Step::ok("two"), Step::ok("three")]).await;
    let request = RequestDescriptor::get(&upstream.url("/")).unwrap();
    let client = Client::builder().build().unwrap();

    for expected in ["one", "two", "three"] {
        let reply = client.call(&request).await.unwrap();
        assert_eq!(reply.text(), expected);
    }

    assert_eq!(upstream.connections(), 1);
    let stats = client.pool_stats(&request);
    assert_eq!((stats.idle, stats.in_use), (1, 0));
}

#[tokio::test]
async fn test_invalid_target_rejected_before_any_attempt() {
    let err = RequestDescriptor::get("ftp://example.com/file").unwrap_err();
    assert!(matches!(err, Failure::InvalidRequest(_)));

    let err = RequestDescriptor::get("not a url").unwrap_err();
    assert!(matches!(err, Failure::InvalidRequest(_)));
}
