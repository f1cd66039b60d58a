//! # Churn Prediction & Nudge Platform API Server
//!
//! The HTTP entrypoint for the churn platform: feature ingestion,
//! churn prediction with nudge triggering, personalized recommendations,
//! and introspection over the nudge rule table.
//!
//! ## Middleware Stack
//!
//! Requests flow through middleware in this order:
//! 1. **Security Headers**: HSTS, CSP, X-Frame-Options
//! 2. **Request ID**: unique tracking for request tracing
//! 3. **Tracing**: structured logging with correlation IDs
//! 4. **Compression**: gzip/brotli response compression
//! 5. **CORS**: cross-origin resource sharing policies
//!
//! This is a single-tenant system: there is no tenant-context middleware.
//!
//! Start the server with `cargo run --bin churn-server`.

use axum::{
    http::{HeaderName, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use churn_catalog::{HashEmbeddingEncoder, ProductIndex};
use churn_core::checkpoint::KvCheckpointer;
use churn_core::config::CorsConfig;
use churn_core::{Checkpointer, Config, KvStore, MetricsRegistry, RedisKvStore, ValueStore};
use churn_features::FeatureStore;
use churn_nudge::{MessageGenerator, NudgeEngine};
use churn_scoring::{AttributionExplainer, ChurnScorer, ModelArtifact};
use churn_workflows::{PredictionWorkflow, RecommendationsWorkflow};
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api_middleware;
mod error;
mod error_handler;
mod handlers;
mod health;
mod state;

use crate::state::AppState;

fn build_cors_layer(cors_config: &CorsConfig) -> Result<CorsLayer, Box<dyn std::error::Error>> {
    let mut cors = CorsLayer::new();

    if cors_config.allowed_origins.contains(&"*".to_string()) {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Result<Vec<HeaderValue>, _> = cors_config.allowed_origins.iter().map(|o| o.parse()).collect();
        cors = cors.allow_origin(origins?);
    }

    if cors_config.allowed_methods.contains(&"*".to_string()) {
        cors = cors.allow_methods(Any);
    } else {
        let methods: Result<Vec<Method>, _> = cors_config.allowed_methods.iter().map(|m| m.parse()).collect();
        cors = cors.allow_methods(methods?);
    }

    if cors_config.allowed_headers.contains(&"*".to_string()) {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Result<Vec<HeaderName>, _> = cors_config.allowed_headers.iter().map(|h| h.parse()).collect();
        cors = cors.allow_headers(headers?);
    }

    Ok(cors)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    info!("Starting churn platform server...");

    let config = Config::load()?;
    info!("Configuration loaded successfully");

    let redis_store = RedisKvStore::connect(&config.kv_store.redis_url(), config.kv_store.namespace.clone()).await?;
    let kv: Arc<dyn KvStore> = Arc::new(redis_store.clone());
    let value_store: Arc<dyn ValueStore> = Arc::new(redis_store);
    info!("KV store connection established");

    let model = Arc::new(ModelArtifact::load(Some(&config.model.model_path))?);
    info!("Model artifact loaded");

    let http = reqwest::Client::new();
    let checkpointer: Arc<dyn Checkpointer> = Arc::new(KvCheckpointer::new(value_store.clone()));
    let features = Arc::new(FeatureStore::new(kv.clone()));
    let scorer = Arc::new(ChurnScorer::new(model.clone(), Box::new(AttributionExplainer::new(model))));
    let message_generator = MessageGenerator::new(
        http.clone(),
        config.llm.base_url.clone(),
        config.llm.api_key.clone(),
        config.llm.model.clone(),
    );
    let nudge = Arc::new(NudgeEngine::new(kv.clone(), http.clone(), config.storefront.api_url.clone(), message_generator));
    let index = Arc::new(ProductIndex::new(value_store.clone(), Arc::new(HashEmbeddingEncoder)));

    let prediction_workflow = Arc::new(PredictionWorkflow::new(features.clone(), scorer.clone(), nudge.clone(), checkpointer.clone()));
    let recommendations_workflow = Arc::new(RecommendationsWorkflow::new(
        features.clone(),
        scorer.clone(),
        index.clone(),
        value_store.clone(),
        checkpointer.clone(),
    ));
    let metrics = Arc::new(MetricsRegistry::new());

    let state = AppState::new(
        config.clone(),
        kv,
        value_store,
        checkpointer,
        features,
        scorer,
        nudge,
        index,
        prediction_workflow,
        recommendations_workflow,
        metrics,
    );

    let app = create_app(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}

fn create_app(state: AppState) -> Result<Router, Box<dyn std::error::Error>> {
    #[derive(OpenApi)]
    #[openapi(
        paths(
            health::health_check,
            health::agent_status,
            handlers::ingest::ingest_family,
            handlers::predict::predict,
            handlers::predict::predict_test,
            handlers::recommendations::reindex,
            handlers::recommendations::generate,
            handlers::recommendations::get_cached,
            handlers::recommendations::status,
            handlers::nudge::list_rules,
            handlers::nudge::get_rule,
            handlers::nudge::test_match,
            handlers::messages::generate_custom_message,
        ),
        tags(
            (name = "health", description = "Liveness and workflow configuration"),
            (name = "features", description = "Feature ingestion"),
            (name = "prediction", description = "Churn prediction"),
            (name = "recommendations", description = "Product recommendations"),
            (name = "nudge", description = "Nudge rule introspection"),
            (name = "messages", description = "Personalized message generation"),
        )
    )]
    struct ApiDoc;

    let router = Router::new()
        .route("/health", get(health::health_check))
        .route("/agent/status", get(health::agent_status))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/ingest/:family", post(handlers::ingest::ingest_family))
        .route("/predict/:user_id", post(handlers::predict::predict))
        .route("/predict/test", post(handlers::predict::predict_test))
        .route("/recommendations/index", post(handlers::recommendations::reindex))
        .route(
            "/recommendations/status",
            get(handlers::recommendations::status),
        )
        .route(
            "/recommendations/:user_id",
            post(handlers::recommendations::generate).get(handlers::recommendations::get_cached),
        )
        .route("/nudge/rules", get(handlers::nudge::list_rules))
        .route("/nudge/rules/:id", get(handlers::nudge::get_rule))
        .route("/nudge/test/:user_id", get(handlers::nudge::test_match))
        .route("/messages/custom", post(handlers::messages::generate_custom_message))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(api_middleware::security_headers::security_headers_middleware))
                .layer(axum::middleware::from_fn(api_middleware::request_id::request_id_middleware))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CompressionLayer::new())
                .layer(build_cors_layer(&state.config.cors)?),
        )
        .with_state(state)
        .fallback(handler_404);

    Ok(router)
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "Resource not found"})))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "churn_api=debug,churn_core=debug,churn_workflows=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
