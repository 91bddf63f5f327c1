//! HTTP integration layer.
//!
//! Provides a `tower::Layer` that runs the admission check in front of any
//! axum router or tower service. Denied requests are answered here with
//! `429 Too Many Requests`; the inner service never sees them.

use crate::application::{
    limiter::{LimitDecision, RateLimiter},
    metrics::Metrics,
    ports::CounterStore,
};
use crate::domain::{identity::IdentityResolver, policy::LimitPolicy};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Body sent with every rejection.
pub const REJECTION_BODY: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame\n";

/// Header carrying the caller's token unless configured otherwise.
pub const DEFAULT_API_KEY_HEADER: &str = "api_key";

/// Remote address used when the server did not record one.
pub const UNKNOWN_ADDR: &str = "unknown";

/// Error returned when building a ThrottleLayer fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Header name is not a valid HTTP header name
    InvalidHeaderName(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::InvalidHeaderName(name) => {
                write!(f, "invalid api key header name: {:?}", name)
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Builder for constructing a `ThrottleLayer`.
pub struct ThrottleLayerBuilder<S> {
    store: S,
    policy: Option<Arc<LimitPolicy>>,
    header_name: String,
    metrics: Option<Metrics>,
}

impl<S> ThrottleLayerBuilder<S>
where
    S: CounterStore,
{
    /// Set the limit policy.
    ///
    /// Without one, the layer uses [`LimitPolicy::default`].
    pub fn with_policy(mut self, policy: LimitPolicy) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Set a policy already shared with other components.
    pub fn with_shared_policy(mut self, policy: Arc<LimitPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set the header the caller's token is read from.
    ///
    /// Header names are case-insensitive. Validated when `build()` is called.
    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    /// Report into an existing metrics tracker.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the layer.
    ///
    /// # Errors
    /// Returns `BuildError::InvalidHeaderName` if the header name is not a
    /// valid HTTP header name.
    pub fn build(self) -> Result<ThrottleLayer<S>, BuildError> {
        let header = HeaderName::from_bytes(self.header_name.to_ascii_lowercase().as_bytes())
            .map_err(|_| BuildError::InvalidHeaderName(self.header_name.clone()))?;

        let policy = self.policy.unwrap_or_default();
        let resolver = IdentityResolver::new(policy.allowed_token().map(str::to_owned));
        let limiter = RateLimiter::new(self.store, policy, self.metrics.unwrap_or_default());

        Ok(ThrottleLayer {
            shared: Arc::new(Shared {
                limiter,
                resolver,
                header,
            }),
        })
    }
}

struct Shared<S> {
    limiter: RateLimiter<S>,
    resolver: IdentityResolver,
    header: HeaderName,
}

/// Tower layer applying admission control to HTTP requests.
///
/// # Example
///
/// ```rust,no_run
/// use axum::{routing::get, Router};
/// use http_throttle::{ClassLimits, LimitPolicy, MemoryStore, ThrottleLayer};
/// use std::net::SocketAddr;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let policy = LimitPolicy::new(
///     ClassLimits::new(10, 1, 60)?,
///     ClassLimits::new(100, 1, 60)?,
///     Some("secret-token".to_string()),
/// );
///
/// let throttle = ThrottleLayer::builder(MemoryStore::new())
///     .with_policy(policy)
///     .build()?;
///
/// let app = Router::new()
///     .route("/", get(|| async { "Hello, world!" }))
///     .layer(throttle);
///
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
/// axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
/// # Ok(())
/// # }
/// ```
pub struct ThrottleLayer<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for ThrottleLayer<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> fmt::Debug for ThrottleLayer<S>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleLayer")
            .field("limiter", &self.shared.limiter)
            .field("header", &self.shared.header)
            .finish()
    }
}

impl<S> ThrottleLayer<S>
where
    S: CounterStore,
{
    /// Create a builder around a counting store.
    pub fn builder(store: S) -> ThrottleLayerBuilder<S> {
        ThrottleLayerBuilder {
            store,
            policy: None,
            header_name: DEFAULT_API_KEY_HEADER.to_string(),
            metrics: None,
        }
    }

    /// Create a layer with the given policy and the default token header.
    pub fn new(store: S, policy: LimitPolicy) -> Self {
        let resolver = IdentityResolver::new(policy.allowed_token().map(str::to_owned));
        Self {
            shared: Arc::new(Shared {
                limiter: RateLimiter::new(store, Arc::new(policy), Metrics::new()),
                resolver,
                header: HeaderName::from_static(DEFAULT_API_KEY_HEADER),
            }),
        }
    }

    /// Get a reference to the underlying limiter.
    pub fn limiter(&self) -> &RateLimiter<S> {
        &self.shared.limiter
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &Metrics {
        self.shared.limiter.metrics()
    }
}

impl<S, Inner> Layer<Inner> for ThrottleLayer<S> {
    type Service = ThrottleService<S, Inner>;

    fn layer(&self, inner: Inner) -> Self::Service {
        ThrottleService {
            inner,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Service produced by [`ThrottleLayer`].
pub struct ThrottleService<S, Inner> {
    inner: Inner,
    shared: Arc<Shared<S>>,
}

impl<S, Inner> Clone for ThrottleService<S, Inner>
where
    Inner: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S, Inner> Service<Request<Body>> for ThrottleService<S, Inner>
where
    S: CounterStore + 'static,
    Inner: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    Inner::Future: Send + 'static,
{
    type Response = Response;
    type Error = Inner::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let shared = Arc::clone(&self.shared);
        // Keep the instance that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let api_key = req
                .headers()
                .get(&shared.header)
                .and_then(|v| v.to_str().ok());
            let remote_addr = req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.to_string());

            let identity = shared
                .resolver
                .resolve(api_key, remote_addr.as_deref().unwrap_or(UNKNOWN_ADDR));

            match shared.limiter.check(&identity).await {
                Ok(LimitDecision::Allow) => inner.call(req).await,
                Ok(LimitDecision::Deny) => Ok(too_many_requests()),
                Err(e) => {
                    tracing::error!(
                        identity = %identity,
                        error = %e,
                        "admission check failed"
                    );
                    Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response())
                }
            }
        })
    }
}

/// The fixed 429 response.
pub fn too_many_requests() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            (
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            ),
            (X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        ],
        REJECTION_BODY,
    )
        .into_response()
}
