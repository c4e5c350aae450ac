use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod db;
mod models;
mod services;
mod storage;

use config::{AppConfig, Platform};
use services::auth::IdentityStore;
use services::catalog::CatalogStore;
use services::favorites::FavoritesStore;
use services::seeder::SeedRunner;
use services::tmdb::{MetadataSource, TmdbClient};
use services::trailers::YoutubeClient;
use storage::{Backend, BackendResolver, FileKeyValueStore, LocalBackend, RemoteBackend, SqliteBackend};

pub struct AppState {
    pub config: AppConfig,
    pub identity: Arc<IdentityStore>,
    pub catalog: Arc<CatalogStore>,
    pub favorites: FavoritesStore,
    pub metadata: Arc<dyn MetadataSource>,
    pub metadata_configured: bool,
    pub youtube: Option<YoutubeClient>,
    pub seeder: SeedRunner,
}

/// Embedded database for the native platform
async fn open_sqlite(config: &AppConfig) -> Result<sqlx::SqlitePool> {
    let database_url = config.database_url();
    tracing::debug!("Database URL: {}", database_url);

    let connect_options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        // WAL lets readers run while the seeder writes
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        // Favorites cascade with their user and movie
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .test_before_acquire(true)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                use sqlx::Executor;
                // Cache size: -8000 = 8MB (negative = KB)
                conn.execute("PRAGMA cache_size = -8000").await?;
                conn.execute("PRAGMA temp_store = MEMORY").await?;
                Ok(())
            })
        })
        .connect_with(connect_options)
        .await?;

    tracing::info!("SQLite configured: WAL mode, foreign keys on");

    db::migrate(&pool).await?;

    let promoted = db::promote_admin(&pool, &config.admin_email).await?;
    if promoted > 0 {
        tracing::info!("Promoted {} to admin", config.admin_email);
    }

    Ok(pool)
}

/// Local tier for the configured platform
async fn open_local_tier(config: &AppConfig) -> Result<Arc<dyn Backend>> {
    match config.platform {
        Platform::Native => {
            let pool = open_sqlite(config).await?;
            Ok(Arc::new(SqliteBackend::new(pool)))
        }
        Platform::Web => {
            let dir = config.paths.local_storage_dir();
            tracing::info!("Local storage: {}", dir.display());
            let backend = LocalBackend::new(
                Arc::new(FileKeyValueStore::new(dir)),
                config.storage_namespace.clone(),
            );
            backend.init().await?;
            Ok(Arc::new(backend))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinevia=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load();

    config.paths.ensure_dirs().await?;

    config.log_config();

    let local = match open_local_tier(&config).await {
        Ok(local) => Some(local),
        Err(e) => {
            tracing::error!("Local {} tier unavailable: {:#}", config.platform, e);
            None
        }
    };

    let remote = RemoteBackend::from_config(&config.remote).map(Arc::new);
    if remote.is_none() && local.is_none() {
        anyhow::bail!("No storage backend could be opened");
    }

    let resolver = Arc::new(BackendResolver::new(remote, local));
    for tier in resolver.tiers().await {
        tracing::info!("Storage tier: {}", tier.kind());
    }

    let sessions = Arc::new(FileKeyValueStore::new(config.paths.secure_storage_dir()));
    let identity = Arc::new(IdentityStore::new(
        resolver.clone(),
        sessions,
        config.admin_email.clone(),
    ));

    let tmdb = TmdbClient::new(&config.metadata);
    let metadata_configured = tmdb.is_configured();
    let youtube = config.metadata.youtube_api_key.clone().map(YoutubeClient::new);

    let shutdown_token = CancellationToken::new();
    let seeder = SeedRunner::new(shutdown_token.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        identity: identity.clone(),
        catalog: Arc::new(CatalogStore::new(resolver.clone())),
        favorites: FavoritesStore::new(resolver, identity),
        metadata: Arc::new(tmdb),
        metadata_configured,
        youtube,
        seeder: seeder.clone(),
    });

    // Build router
    let app = api::routes()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port).parse()?;
    tracing::info!("Starting server on {}", addr);

    // Create shutdown signal listener
    let shutdown_signal = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
        }
    };

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    // After server stops, stop any seeding run
    tracing::info!("Initiating graceful shutdown...");
    seeder.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
