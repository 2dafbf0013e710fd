use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use appointment_cell::{AppState, AppointmentStore, MemoryStore};
use notification_cell::{BroadcastDelivery, DeliveryChannel};
use shared_config::AppConfig;
use shared_database::ScopeLockRegistry;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting HospEase API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    // Wire the queue core: store, per-scope locks, delivery fan-out
    let store: Arc<dyn AppointmentStore> = Arc::new(MemoryStore::new());
    let locks = ScopeLockRegistry::new();
    let delivery: Arc<dyn DeliveryChannel> = Arc::new(BroadcastDelivery::default());
    let lifecycle = Arc::new(AppointmentLifecycleService::new(
        store, locks, delivery, &config,
    ));

    let state = AppState::new(Arc::clone(&config), lifecycle);

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
