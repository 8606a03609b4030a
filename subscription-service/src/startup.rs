//! Application startup and lifecycle management.

use crate::config::{StorageBackend, SubscriptionConfig};
use crate::handlers::{self, advertisers, plans, refunds, subscriptions, sweeps};
use crate::services::{
    init_metrics, Engine, InMemoryStore, LogNotifier, MongoStore, SubscriptionStore, SystemClock,
};
use axum::{
    middleware::from_fn,
    routing::{get, patch, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

/// Build the HTTP router over an engine.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        // Advertisers
        .route("/advertisers", post(advertisers::create_advertiser))
        .route(
            "/advertisers/:id",
            get(advertisers::get_advertiser).delete(advertisers::delete_advertiser),
        )
        .route("/advertisers/:id/billing", patch(advertisers::update_billing))
        .route(
            "/advertisers/:id/financial-summary",
            get(advertisers::financial_summary),
        )
        .route("/cascades/:id", get(advertisers::get_cascade))
        .route("/cascades/:id/resume", post(advertisers::resume_cascade))
        // Plans
        .route("/plans", post(plans::create_plan))
        .route("/plans/:id", get(plans::get_plan))
        .route("/plans/:id/deactivate", post(plans::deactivate_plan))
        // Subscriptions
        .route("/subscriptions", post(subscriptions::create_subscription))
        .route("/subscriptions/:id", get(subscriptions::get_subscription))
        .route("/subscriptions/:id/history", get(subscriptions::get_history))
        .route(
            "/subscriptions/:id/payments",
            post(subscriptions::record_payment),
        )
        .route(
            "/subscriptions/:id/cancel",
            post(subscriptions::cancel_subscription),
        )
        .route(
            "/subscriptions/:id/pause",
            post(subscriptions::pause_subscription),
        )
        .route(
            "/subscriptions/:id/resume",
            post(subscriptions::resume_subscription),
        )
        .route(
            "/subscriptions/:id/stop",
            post(subscriptions::stop_subscription),
        )
        .route(
            "/subscriptions/:id/reactivate",
            post(subscriptions::reactivate_subscription),
        )
        .route("/subscriptions/:id/grace", post(subscriptions::activate_grace))
        .route("/subscriptions/:id/grace/end", post(subscriptions::end_grace))
        // Refunds
        .route("/refunds", post(refunds::create_refund))
        .route("/refunds/:id", get(refunds::get_refund))
        .route("/refunds/:id/status", patch(refunds::update_refund_status))
        // Scheduled jobs
        .route("/sweeps/expirations", post(sweeps::sweep_expirations))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    actor_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: SubscriptionConfig) -> Result<Self, AppError> {
        init_metrics();

        let store: Arc<dyn SubscriptionStore> = match config.storage.backend {
            StorageBackend::Mongodb => {
                let store = MongoStore::connect(
                    &config.storage.mongodb.uri,
                    &config.storage.mongodb.database,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to MongoDB");
                    e
                })?;
                store.initialize_indexes().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to create MongoDB indexes");
                    e
                })?;
                Arc::new(store)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                Arc::new(InMemoryStore::new())
            }
        };

        let clock = Arc::new(SystemClock::new(config.engine.business_offset()?));
        let notifier = Arc::new(LogNotifier::new(config.engine.notifications_enabled));
        let engine = Engine::new(store, clock, notifier, config.engine.settings());

        let router = build_router(AppState::new(engine));

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Subscription service listener bound");

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run_until_stopped(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        tracing::info!(
            service = "subscription-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
