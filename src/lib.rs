pub mod aggregation;
pub mod cache;
pub mod clock;
pub mod comparison;
pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod handlers;
pub mod migrations;
pub mod models;
pub mod movement;
pub mod orchestrator;
pub mod record_store;
pub mod scheduler;
pub mod time_period;

use std::sync::Arc;

use db::RegistryDb;
use orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RegistryDb>,
    pub orchestrator: Arc<Orchestrator>,
}
