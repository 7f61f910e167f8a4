pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::{
    routing::{get, post},
    Router,
};
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use config::Config;
use services::calculator::RateCalculator;
use services::jwt::JwtService;
use services::ledger::Database;
use services::mercadopago::MercadoPagoClient;
use services::subscription::SubscriptionService;
use services::tax::FiscalTable;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub calculator: Arc<RateCalculator>,
    pub jwt: JwtService,
    pub subscriptions: SubscriptionService,
}

pub struct Application {
    port: u16,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let db = Database::new(&config.database).await?;
        db.run_migrations().await?;

        let gateway = MercadoPagoClient::new(config.mercadopago.clone());
        if gateway.is_configured() {
            tracing::info!("MercadoPago client initialized");
        } else {
            tracing::warn!(
                "MercadoPago credentials not configured - premium checkout will be unavailable"
            );
        }

        let calculator = Arc::new(RateCalculator::new(FiscalTable::brazil_2025()));
        let jwt = JwtService::new(&config.auth.jwt_secret);
        let subscriptions = SubscriptionService::new(
            Arc::new(db.clone()),
            gateway,
            config.plans.clone(),
        );

        let state = AppState {
            db,
            config: config.clone(),
            calculator,
            jwt,
            subscriptions,
        };

        // Subscription routes require a bearer token; everything else is public.
        let protected = Router::new()
            .route("/api/subscription/status", get(handlers::subscription::status))
            .route(
                "/api/subscription/checkout",
                post(handlers::subscription::checkout),
            )
            .route(
                "/api/subscription/cancel",
                post(handlers::subscription::cancel),
            )
            .route_layer(from_fn_with_state(
                state.clone(),
                middleware::auth::auth_middleware,
            ));

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics_handler))
            // Calculator endpoints
            .route(
                "/api/calculator/calculate",
                post(handlers::calculator::calculate),
            )
            .route(
                "/api/calculator/tax-info/:regime",
                get(handlers::calculator::tax_info),
            )
            .route("/api/calculator/compare", get(handlers::calculator::compare))
            // Gateway webhook: authenticated by payment-id re-fetch, not JWT
            .route(
                "/webhooks/mercadopago",
                post(handlers::subscription::mercadopago_webhook),
            )
            .merge(protected)
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
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state);

        Ok(Self {
            port: config.server.port,
            router,
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
