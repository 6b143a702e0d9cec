//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, request ID, gate, rate limits)
//! - Bind server to listener
//! - Drain background pruning on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::handlers;
use crate::http::proxy::{self, ProxyRules};
use crate::push::{
    DispatchLimits, Presentation, PushDispatcher, PushTransport, SubscriptionRegistry,
    SubscriptionStore,
};
use crate::remote::RemoteDataClient;
use crate::security::origin::{content_type_middleware, origin_gate_middleware};
use crate::security::rate_limit::rate_limit_middleware;
use crate::security::{
    CounterStore, JwtSessionVerifier, LimiterClass, RateLimitGuard, RateLimiter, SessionVerifier,
};

/// How long shutdown waits for outstanding prune tasks.
const PRUNE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: SubscriptionRegistry,
    pub dispatcher: Option<PushDispatcher>,
    pub public_key: Option<Arc<str>>,
    pub send_secret: Option<Arc<str>>,
    pub limiter: Arc<RateLimiter>,
    pub sessions: Arc<dyn SessionVerifier>,
    pub remote: Option<RemoteDataClient>,
    pub proxy_rules: Arc<ProxyRules>,
    config: Arc<GatewayConfig>,
}

impl AppState {
    /// State with no push transport, no counter store and no remote service.
    pub fn new(config: GatewayConfig, subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        let non_empty = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(Arc::from)
        };
        Self {
            registry: SubscriptionRegistry::new(subscriptions),
            dispatcher: None,
            public_key: non_empty(&config.push.vapid_public_key),
            send_secret: non_empty(&config.push.send_secret),
            limiter: Arc::new(RateLimiter::new(&config.rate_limit, None)),
            sessions: Arc::new(JwtSessionVerifier::new(&config.session)),
            remote: None,
            proxy_rules: Arc::new(ProxyRules::from_config(&config.remote)),
            config: Arc::new(config),
        }
    }

    /// Enable sending through `transport`.
    pub fn with_transport(mut self, transport: Arc<dyn PushTransport>) -> Self {
        self.dispatcher = Some(PushDispatcher::new(
            self.registry.clone(),
            transport,
            Presentation::from(&self.config.push),
            DispatchLimits::from(&self.config.push),
        ));
        self
    }

    pub fn with_counter_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.limiter = Arc::new(RateLimiter::new(&self.config.rate_limit, Some(store)));
        self
    }

    pub fn with_session_verifier(mut self, sessions: Arc<dyn SessionVerifier>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_remote(mut self, remote: RemoteDataClient) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// HTTP server for the push gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

impl GatewayServer {
    pub fn new(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// The fully layered router, for serving or for driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let listener = &state.config().listener;
        let request_timeout = Duration::from_secs(listener.request_timeout_secs);
        let max_body_size = listener.max_body_size;

        let api_guard = RateLimitGuard::new(state.limiter.clone(), LimiterClass::Api);
        let auth_guard = RateLimitGuard::new(state.limiter.clone(), LimiterClass::Auth);

        // Session-authenticated routes called from the web surface.
        let browser = Router::new()
            .route(
                "/push-subscribe",
                post(handlers::push_subscribe).delete(handlers::push_unsubscribe),
            )
            .route("/gas", get(proxy::proxy_read).post(proxy::proxy_write))
            .route_layer(middleware::from_fn_with_state(api_guard, rate_limit_middleware))
            .route_layer(middleware::from_fn(origin_gate_middleware));

        // Called by trusted backend jobs with the shared secret.
        let backend = Router::new()
            .route("/push-send", post(handlers::push_send))
            .route_layer(middleware::from_fn_with_state(auth_guard, rate_limit_middleware))
            .route_layer(middleware::from_fn(content_type_middleware));

        Router::new()
            .route("/health", get(handlers::health))
            .route("/push-public-key", get(handlers::push_public_key))
            .merge(browser)
            .merge(backend)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(max_body_size))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server until `shutdown` fires, then drain pruning.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            sending_enabled = self.state.dispatcher.is_some(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, no longer accepting requests");
            })
            .await?;

        if let Some(dispatcher) = &self.state.dispatcher {
            let abandoned = dispatcher.pruner().drain(PRUNE_DRAIN_TIMEOUT).await;
            if abandoned > 0 {
                tracing::warn!(abandoned, "Prune tasks abandoned at shutdown");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
