pub mod config;
pub mod database;
pub mod lifecycle;
pub mod monitoring;
pub mod orchestrator;
pub mod pipeline;
pub mod pool;
pub mod sinks;
