pub mod analysis;
pub mod filter;
pub mod freight_record;
pub mod saved_analysis;
pub mod schedule;
pub mod time_period;
