//! ClickHouse schema for the freight record store (spec §6: "persisted state
//! layout... physical schema choice is free").
//!
//! Grounded on the teacher's migration runner (`migrations.rs`): a flat list
//! of idempotent DDL statements executed in order against a client with no
//! default database bound, so `CREATE DATABASE` always succeeds.

use clickhouse::Client;

const MIGRATIONS: &[&str] = &[
    "CREATE DATABASE IF NOT EXISTS freight",
    r"CREATE TABLE IF NOT EXISTS freight.freight_records
(
    id                 String,
    record_date        DateTime64(3, 'UTC') CODEC(Delta, ZSTD(1)),
    origin_id          LowCardinality(String),
    destination_id     LowCardinality(String),
    carrier_id         LowCardinality(String),
    transport_mode     LowCardinality(String),
    freight_charge     Decimal(18, 6),
    currency_code      LowCardinality(String),
    service_level      String,
    additional_charges String,
    source_system      LowCardinality(String),
    data_quality_flag  LowCardinality(String),
    deleted_at         Nullable(DateTime64(3, 'UTC')),
    INDEX idx_carrier carrier_id TYPE bloom_filter(0.01) GRANULARITY 1
)
ENGINE = MergeTree
PARTITION BY toYYYYMM(record_date)
ORDER BY (origin_id, destination_id, record_date, id)
SETTINGS index_granularity = 8192",
];

/// Run all migrations against ClickHouse. Every statement is `IF NOT
/// EXISTS`, so this is safe to call on every startup.
pub async fn run(url: &str, user: &str, password: &str) -> anyhow::Result<()> {
    let client = Client::default()
        .with_url(url)
        .with_user(user)
        .with_password(password);

    tracing::info!("running clickhouse migrations ({} statements)", MIGRATIONS.len());

    for (i, sql) in MIGRATIONS.iter().enumerate() {
        let preview: String = sql.chars().take(80).collect();
        tracing::debug!("migration {}/{}: {}...", i + 1, MIGRATIONS.len(), preview);
        client.query(sql).execute().await.map_err(|e| {
            tracing::error!("migration {}/{} failed: {e}", i + 1, MIGRATIONS.len());
            e
        })?;
    }

    tracing::info!("clickhouse migrations complete");
    Ok(())
}
