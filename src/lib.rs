pub mod cache_store;
pub mod config;
pub mod errors;
pub mod live_status;
pub mod models;
pub mod notifications;
pub mod schedule;
pub mod sources;
pub mod utils;
