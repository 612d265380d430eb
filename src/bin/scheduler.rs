use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use freight_movement_engine::cache::ResultCache;
use freight_movement_engine::clock::SystemClock;
use freight_movement_engine::config::EngineConfig;
use freight_movement_engine::db::RegistryDb;
use freight_movement_engine::migrations;
use freight_movement_engine::orchestrator::Orchestrator;
use freight_movement_engine::record_store::RecordStore;
use freight_movement_engine::scheduler::ScheduleExecutor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("freight_movement_engine=debug")),
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

    let ch = clickhouse::Client::default()
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
        clock.clone(),
        config.orchestrator.clone(),
        config.cache.clone(),
        config.period.clone(),
    ));

    let executor = Arc::new(ScheduleExecutor::new(
        registry,
        orchestrator,
        clock,
        config.scheduler.worker_pool_size,
    ));

    tracing::info!(
        poll_interval_secs = config.scheduler.poll_interval_secs,
        worker_pool_size = config.scheduler.worker_pool_size,
        "freight-scheduler starting"
    );

    let handle = executor.spawn(Duration::from_secs(config.scheduler.poll_interval_secs));
    handle.await?;
    Ok(())
}
