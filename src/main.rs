use std::sync::Arc;
use std::time::Duration;

use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use libris::{create_router, AppState, Config, Maintainer};
use libris_core::{Library, SystemClock, TokenCodec};
use libris_db::{init_database, RedbPersistence};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Required: LIBRIS_TOKEN_SECRET (at least 16 bytes)");
            eprintln!("Optional: LIBRIS_LISTEN_ADDR (default: 0.0.0.0:3000)");
            eprintln!("Optional: LIBRIS_DB_PATH (default: ./libris.redb)");
            eprintln!("Optional: LIBRIS_SWEEP_INTERVAL_SECS (default: 3600)");
            eprintln!("Optional: LIBRIS_ADMIN_PASSWORD (seeds the superadmin account)");
            std::process::exit(1);
        }
    };

    tracing::info!("Starting Libris server");
    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Database: {:?}", config.db_path);

    // Open database
    let db = match init_database(&config.db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Database error: {}", e);
            std::process::exit(1);
        }
    };

    let library = Library::new(
        Arc::new(RedbPersistence::new(db)),
        Arc::new(SystemClock),
        TokenCodec::new(&config.token_secret),
    );
    if let Err(e) = library.init() {
        eprintln!("Failed to initialize library data: {}", e);
        std::process::exit(1);
    }

    if let Some(password) = &config.admin_password {
        match library.accounts.ensure_superadmin(password).await {
            Ok(true) => tracing::info!("Created superadmin account"),
            Ok(false) => {}
            Err(e) => {
                eprintln!("Failed to seed superadmin account: {}", e);
                std::process::exit(1);
            }
        }
    }

    let state = AppState::new(library);

    // Start background maintenance
    let maintainer = Maintainer::new(state.library.clone());
    let interval = Duration::from_secs(config.sweep_interval_secs);
    tokio::spawn(async move {
        maintainer.run(interval).await;
    });
    tracing::info!(
        "Maintenance running every {} seconds",
        config.sweep_interval_secs
    );

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server running at http://{}", config.listen_addr);

    axum::serve(listener, app).await.expect("Server error");
}
