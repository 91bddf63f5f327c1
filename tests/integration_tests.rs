use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::{routing::get, Router};
use http_throttle::infrastructure::mocks::{FailingStore, MockCaptureLayer, MockClock};
use http_throttle::{
    ClassLimits, CounterStore, LimitPolicy, MemoryStore, ThrottleLayer, REJECTION_BODY,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

fn app<S: CounterStore + 'static>(throttle: ThrottleLayer<S>) -> Router {
    Router::new()
        .route("/", get(|| async { "Hello, world!" }))
        .layer(throttle)
}

fn request(ip: [u8; 4], api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/");
    if let Some(key) = api_key {
        builder = builder.header("api_key", key);
    }
    let mut req = builder.body(Body::empty()).unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((ip, 40_000))));
    req
}

async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn body_string(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Store driven by a mock clock, shared between the test and the layer.
fn clocked_store() -> (Arc<MemoryStore>, MockClock) {
    let clock = MockClock::new(Instant::now());
    let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
    (store, clock)
}

fn policy(ip: (u32, u64, u64), token: (u32, u64, u64), allowed: Option<&str>) -> LimitPolicy {
    LimitPolicy::new(
        ClassLimits::new(ip.0, ip.1, ip.2).unwrap(),
        ClassLimits::new(token.0, token.1, token.2).unwrap(),
        allowed.map(str::to_string),
    )
}

#[tokio::test]
async fn test_ip_budget_block_and_recovery() {
    let (store, clock) = clocked_store();
    let throttle = ThrottleLayer::builder(Arc::clone(&store))
        .with_policy(policy((10, 60, 60), (100, 60, 60), None))
        .build()
        .unwrap();
    let app = app(throttle.clone());
    let caller = [192, 168, 1, 20];

    for i in 1..=10 {
        let resp = send(&app, request(caller, None)).await;
        assert_eq!(resp.status(), StatusCode::OK, "request {} should pass", i);
        assert_eq!(body_string(resp).await, "Hello, world!");
    }

    let resp = send(&app, request(caller, None)).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_string(resp).await, REJECTION_BODY);
    assert!(store.get("ip:192.168.1.20:blocked").await.unwrap().is_some());

    // Still blocked just before the cool-down ends
    clock.advance(Duration::from_secs(59));
    for _ in 0..3 {
        let resp = send(&app, request(caller, None)).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    // A fresh window once the cool-down has run out
    clock.advance(Duration::from_secs(2));
    let resp = send(&app, request(caller, None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        store.get("ip:192.168.1.20").await.unwrap().as_deref(),
        Some("1")
    );

    let snapshot = throttle.metrics().snapshot();
    assert_eq!(snapshot.requests_allowed, 11);
    assert_eq!(snapshot.requests_denied, 4);
    assert_eq!(snapshot.blocks_triggered, 1);
}

#[tokio::test]
async fn test_counter_resets_after_window() {
    let (store, clock) = clocked_store();
    let app = app(
        ThrottleLayer::builder(store)
            .with_policy(policy((3, 1, 60), (100, 1, 60), None))
            .build()
            .unwrap(),
    );
    let caller = [10, 0, 0, 1];

    // Three per second, spread over several windows, never trips the limit
    for _ in 0..5 {
        for _ in 0..3 {
            let resp = send(&app, request(caller, None)).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }
        clock.advance(Duration::from_secs(1));
    }
}

#[tokio::test]
async fn test_trusted_token_uses_its_own_budget() {
    let (store, _clock) = clocked_store();
    let app = app(
        ThrottleLayer::builder(store)
            .with_policy(policy((10, 60, 60), (20, 60, 60), Some("token")))
            .build()
            .unwrap(),
    );
    let caller = [172, 16, 0, 5];

    for i in 1..=20 {
        let resp = send(&app, request(caller, Some("token"))).await;
        assert_eq!(resp.status(), StatusCode::OK, "token request {} should pass", i);
    }
    let resp = send(&app, request(caller, Some("token"))).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    // An unknown token falls back to the IP budget, which is still untouched
    for i in 1..=10 {
        let resp = send(&app, request(caller, Some("error"))).await;
        assert_eq!(resp.status(), StatusCode::OK, "ip request {} should pass", i);
    }
    let resp = send(&app, request(caller, Some("error"))).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_without_token_header_counts_by_ip() {
    let (store, _clock) = clocked_store();
    let app = app(
        ThrottleLayer::builder(Arc::clone(&store))
            .with_policy(policy((2, 60, 60), (100, 60, 60), Some("token")))
            .build()
            .unwrap(),
    );

    send(&app, request([10, 1, 1, 1], None)).await;
    send(&app, request([10, 1, 1, 1], Some(""))).await;

    assert_eq!(store.get("ip:10.1.1.1").await.unwrap().as_deref(), Some("2"));
    assert_eq!(store.get("token:").await.unwrap(), None);
}

#[tokio::test]
async fn test_callers_are_counted_independently() {
    let (store, _clock) = clocked_store();
    let app = app(
        ThrottleLayer::builder(store)
            .with_policy(policy((1, 60, 60), (100, 60, 60), None))
            .build()
            .unwrap(),
    );

    assert_eq!(send(&app, request([10, 0, 0, 1], None)).await.status(), StatusCode::OK);
    assert_eq!(
        send(&app, request([10, 0, 0, 1], None)).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(send(&app, request([10, 0, 0, 2], None)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_custom_header_name() {
    let (store, _clock) = clocked_store();
    let app = app(
        ThrottleLayer::builder(Arc::clone(&store))
            .with_policy(policy((1, 60, 60), (100, 60, 60), Some("secret")))
            .with_header_name("X-Api-Key")
            .build()
            .unwrap(),
    );

    let mut req = Request::builder()
        .uri("/")
        .header("x-api-key", "secret")
        .body(Body::empty())
        .unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 3], 1))));
    assert_eq!(send(&app, req).await.status(), StatusCode::OK);

    assert_eq!(store.get("token:secret").await.unwrap().as_deref(), Some("1"));
}

#[tokio::test]
async fn test_malformed_counter_fails_open_and_logs() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let (store, _clock) = clocked_store();
    store
        .set_with_expiry("ip:10.0.0.9", "abc", Duration::from_secs(60))
        .await
        .unwrap();

    let throttle = ThrottleLayer::builder(Arc::clone(&store))
        .with_policy(policy((1, 60, 60), (100, 60, 60), None))
        .build()
        .unwrap();
    let app = app(throttle.clone());

    for _ in 0..3 {
        let resp = send(&app, request([10, 0, 0, 9], None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let warnings = capture.at_level(Level::WARN);
    assert_eq!(warnings.len(), 3);
    assert_eq!(warnings[0].field("identity"), Some("ip:10.0.0.9"));
    assert_eq!(warnings[0].field("value"), Some("abc"));
    assert_eq!(throttle.metrics().malformed_counters(), 3);

    // The bad value is left untouched
    assert_eq!(store.get("ip:10.0.0.9").await.unwrap().as_deref(), Some("abc"));
}

#[tokio::test]
async fn test_block_is_logged() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let (store, _clock) = clocked_store();
    let app = app(
        ThrottleLayer::builder(store)
            .with_policy(policy((1, 60, 30), (100, 60, 60), None))
            .build()
            .unwrap(),
    );

    send(&app, request([10, 0, 0, 4], None)).await;
    send(&app, request([10, 0, 0, 4], None)).await;

    let blocks: Vec<_> = capture
        .at_level(Level::INFO)
        .into_iter()
        .filter(|e| e.message.contains("blocked"))
        .collect();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].field("identity"), Some("ip:10.0.0.4"));
    assert_eq!(blocks[0].field("class"), Some("ip"));
    assert_eq!(blocks[0].field("block_secs"), Some("30"));
}

#[tokio::test]
async fn test_store_failure_is_internal_error() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let store = Arc::new(FailingStore::new());
    let throttle = ThrottleLayer::builder(Arc::clone(&store)).build().unwrap();
    let app = app(throttle.clone());

    let resp = send(&app, request([10, 0, 0, 5], None)).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let errors = capture.at_level(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].field("error").unwrap().contains("connection refused"));
    assert_eq!(throttle.metrics().store_errors(), 1);
    assert_eq!(store.calls(), 1);
}
