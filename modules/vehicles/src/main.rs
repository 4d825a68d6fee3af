use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use event_bus::{EventBus, InMemoryBus, NatsBus};
use event_store::{EventStore, InMemoryEventStore, JetStreamEventStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use vehicles_rs::{
    config::Config,
    dispatcher::{DispatchError, Dispatcher, RequestEnvelope},
    projector::VehicleProjector,
    store::{InMemoryVehicleStore, VehicleStore},
    VehicleService,
};

/// JetStream stream holding the domain event history
const EVENT_STREAM_NAME: &str = "VEHICLE_EVENTS";
/// Subject prefix owned by the event stream
const EVENT_SUBJECT_PREFIX: &str = "es.events";

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting vehicles service...");

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        "Configuration loaded: host={}, port={}, bus_type={}",
        config.host,
        config.port,
        config.bus_type
    );

    // Create messaging backends
    let (bus, event_store): (Arc<dyn EventBus>, Arc<dyn EventStore>) =
        match config.bus_type.to_lowercase().as_str() {
            "inmemory" => {
                tracing::info!("Using InMemory bus and event log");
                (
                    Arc::new(InMemoryBus::new()),
                    Arc::new(InMemoryEventStore::new()),
                )
            }
            "nats" => {
                tracing::info!("Connecting to NATS at {}", config.nats_url);
                let client = async_nats::connect(&config.nats_url)
                    .await
                    .expect("Failed to connect to NATS");
                let log = JetStreamEventStore::connect(
                    client.clone(),
                    EVENT_STREAM_NAME,
                    EVENT_SUBJECT_PREFIX,
                )
                .await
                .expect("Failed to connect event log to JetStream");
                (Arc::new(NatsBus::new(client)), Arc::new(log))
            }
            _ => panic!(
                "Invalid BUS_TYPE: {}. Must be 'inmemory' or 'nats'",
                config.bus_type
            ),
        };

    // Materialized view store
    let store: Arc<dyn VehicleStore> = Arc::new(InMemoryVehicleStore::new());

    // Service and dispatcher
    let service = Arc::new(VehicleService::new(
        store.clone(),
        event_store.clone(),
        bus.clone(),
        config.service_key.clone(),
        Duration::from_millis(config.generation_period_ms),
    ));
    let dispatcher = Arc::new(Dispatcher::new(service));

    // Recovery replay first, then live consumption
    let projector = VehicleProjector::new(store.clone());
    let replay = event_store
        .replay(VehicleProjector::AGGREGATE_TYPES)
        .await
        .expect("Failed to start recovery replay");
    projector.run(replay).await;
    tracing::info!("Recovery replay complete");

    let live = event_store
        .subscribe(&config.service_key, VehicleProjector::AGGREGATE_TYPES)
        .await
        .expect("Failed to subscribe projector to event log");
    let live_projector = projector.clone();
    tokio::spawn(async move {
        live_projector.run(live).await;
        tracing::warn!("Projector live stream ended");
    });

    // Build the application router
    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/request", post(handle_request))
        .with_state(dispatcher)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        );

    // Bind to the configured address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Vehicles service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "module": "vehicles",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Accepts already-formed command/query envelopes
///
/// Parsing transport requests into envelopes is the gateway's job; this
/// route is the narrow seam behind it.
async fn handle_request(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(envelope): Json<RequestEnvelope>,
) -> (StatusCode, Json<serde_json::Value>) {
    match dispatcher.dispatch(envelope).await {
        Ok(response) => {
            let body = serde_json::to_value(&response)
                .unwrap_or_else(|_| serde_json::json!({"result": {"code": 500}}));
            (StatusCode::OK, Json(body))
        }
        Err(DispatchError::UnknownOperation(operation)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("unknown operation: {operation}")})),
        ),
        Err(DispatchError::StorageTimeout(msg)) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(serde_json::json!({"error": msg})),
        ),
    }
}
