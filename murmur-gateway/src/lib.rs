pub mod backplane;
pub mod broadcast;
pub mod config;
pub mod consumer;
pub mod error;
pub mod events;
pub mod game;
pub mod heartbeat;
pub mod helpers;
pub mod hub;
pub mod registry;
mod routes;
pub mod scaling;
pub mod session;
mod validation;

use axum::{Router, http::StatusCode, routing::get};
use murmur_store::Store;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::backplane::{DurableCounter, EventLog, FleetCapacity, StoreLog};
use crate::broadcast::BroadcastBatcher;
use crate::config::Config;
use crate::consumer::LogConsumer;
use crate::hub::Hub;
use crate::registry::Registry;
use crate::scaling::ScalingGate;

/// Everything an instance shares between its sockets and background tasks.
pub struct AppState {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub hub: Arc<Hub>,
    pub scaling: Arc<ScalingGate>,
    pub log: Arc<dyn EventLog>,
}

impl AppState {
    pub fn new(
        config: Config,
        log: Arc<dyn EventLog>,
        counter: Arc<dyn DurableCounter>,
        fleet: Arc<dyn FleetCapacity>,
    ) -> Arc<Self> {
        let scaling = Arc::new(ScalingGate::new(&config, counter, fleet));
        Arc::new(Self {
            registry: Arc::new(Registry::new(config.max_connections)),
            hub: Arc::new(Hub::new(config.round.clone())),
            scaling,
            log,
            config,
        })
    }

    /// Wire every collaborator to a single shared store.
    pub fn from_store(config: Config, store: Store) -> Arc<Self> {
        let log = Arc::new(StoreLog::new(store.clone(), config.log_stream.clone()));
        let shared = Arc::new(store);
        Self::new(config, log, shared.clone(), shared)
    }
}

/// Start the log consumer, broadcast batcher, and heartbeat.
pub fn spawn_workers(state: &Arc<AppState>) -> Vec<JoinHandle<()>> {
    let consumer = LogConsumer::new(state.log.clone(), state.hub.clone(), state.config.log_block);
    let batcher = BroadcastBatcher::new(state.hub.clone(), state.registry.clone());

    vec![
        tokio::spawn(consumer.run()),
        tokio::spawn(batcher.run(state.config.broadcast_interval)),
        tokio::spawn(heartbeat::run(
            state.clone(),
            state.config.heartbeat_interval,
        )),
    ]
}

/// Create the application router
pub fn create_app(state: Arc<AppState>) -> Router {
    let status_routes = Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/available", get(routes::available))
        .route("/connections", get(routes::connections))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout,
        ));

    Router::new()
        .route("/", get(routes::socket))
        .merge(status_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
