use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use clickhouse::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use freight_movement_engine::cache::ResultCache;
use freight_movement_engine::clock::SystemClock;
use freight_movement_engine::config::EngineConfig;
use freight_movement_engine::db::RegistryDb;
use freight_movement_engine::orchestrator::Orchestrator;
use freight_movement_engine::record_store::RecordStore;
use freight_movement_engine::{handlers, migrations, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("freight_movement_engine=debug,tower_http=debug")),
        )
        .init();

    let config_path = std::env::var("FREIGHT_CONFIG").unwrap_or_else(|_| "./freight_engine.toml".to_string());
    let config = EngineConfig::load(&config_path)?.apply_env_overrides();

    migrations::run(
        &config.store.clickhouse_url,
        &config.store.clickhouse_user,
        &config.store.clickhouse_password,
    )
    .await?;

    let ch = Client::default()
        .with_url(&config.store.clickhouse_url)
        .with_database(&config.store.clickhouse_database)
        .with_user(&config.store.clickhouse_user)
        .with_password(&config.store.clickhouse_password);

    let registry = Arc::new(RegistryDb::open(&config.registry_db.path)?);
    registry.run_migrations()?;
    tracing::info!("registry db opened at {}", config.registry_db.path);

    let clock = Arc::new(SystemClock);
    let store = Arc::new(RecordStore::new(ch, config.store.batch_size));
    let cache = Arc::new(ResultCache::new(clock.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        registry.clone(),
        store,
        cache,
        clock,
        config.orchestrator.clone(),
        config.cache.clone(),
        config.period.clone(),
    ));

    let state = AppState { registry, orchestrator };

    let app = Router::new()
        .route(
            "/api/v1/time-periods",
            post(handlers::time_periods::create_time_period),
        )
        .route(
            "/api/v1/time-periods/{id}",
            get(handlers::time_periods::get_time_period),
        )
        .route("/api/v1/analyses", post(handlers::analyses::analyze))
        .route("/api/v1/analyses/{id}", get(handlers::analyses::get_analysis))
        .route(
            "/api/v1/analyses/{id}/cancel",
            post(handlers::analyses::cancel_analysis),
        )
        .route("/api/v1/compare", post(handlers::analyses::compare))
        .route(
            "/api/v1/saved-analyses",
            get(handlers::saved_analyses::list_saved_analyses).post(handlers::saved_analyses::create_saved_analysis),
        )
        .route(
            "/api/v1/saved-analyses/{id}",
            get(handlers::saved_analyses::get_saved_analysis)
                .put(handlers::saved_analyses::update_saved_analysis)
                .delete(handlers::saved_analyses::delete_saved_analysis),
        )
        .route(
            "/api/v1/saved-analyses/{id}/run",
            post(handlers::saved_analyses::run_saved_analysis),
        )
        .route(
            "/api/v1/schedules",
            get(handlers::schedules::list_schedules).post(handlers::schedules::create_schedule),
        )
        .route(
            "/api/v1/schedules/{id}",
            get(handlers::schedules::get_schedule)
                .put(handlers::schedules::update_schedule)
                .delete(handlers::schedules::delete_schedule),
        )
        .route(
            "/api/v1/schedules/{id}/deactivate",
            put(handlers::schedules::deactivate_schedule),
        )
        .route("/healthz", get(handlers::health::healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("freight-movement-engine listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
