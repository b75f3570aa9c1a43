use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{AppointmentState, ClinicStore, DirectorySeed, InMemoryStore, SupabaseStore};
use reconciler_cell::{transport_from_config, ReconcilerConfig, ReconcilerRunner};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::SystemClock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic booking API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());
    info!("Slot policy: {}", config.slot_policy);

    // Pick the backing store
    let store: Arc<dyn ClinicStore> = if config.is_database_configured() {
        info!("Using Supabase store at {}", config.supabase_url);
        Arc::new(SupabaseStore::new(Arc::new(SupabaseClient::new(&config))))
    } else {
        warn!("SUPABASE_URL/SUPABASE_ANON_KEY not set, using in-memory store; data is lost on restart");
        Arc::new(in_memory_store(&config).await?)
    };

    // Create shared state
    let state = AppointmentState::new(Arc::clone(&config), store, Arc::new(SystemClock))
        .context("invalid clinic calendar configuration")?;

    // Background reconciler
    let runner = ReconcilerRunner::start(
        &state,
        &ReconcilerConfig::from(&*config),
        transport_from_config(&config),
    );

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
    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    info!("Listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    runner.shutdown().await;
    info!("Server stopped");
    Ok(())
}

async fn in_memory_store(config: &AppConfig) -> anyhow::Result<InMemoryStore> {
    let store = InMemoryStore::new();
    if config.directory_seed_path.is_empty() {
        return Ok(store);
    }

    let raw = tokio::fs::read_to_string(&config.directory_seed_path)
        .await
        .with_context(|| format!("failed to read {}", config.directory_seed_path))?;
    let seed: DirectorySeed = serde_json::from_str(&raw)
        .with_context(|| format!("invalid directory seed in {}", config.directory_seed_path))?;

    info!(
        "Seeded {} doctors and {} patients from {}",
        seed.doctors.len(),
        seed.patients.len(),
        config.directory_seed_path
    );
    store.seed_directory(seed).await;
    Ok(store)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
