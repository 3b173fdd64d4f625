pub mod config;
pub mod engine;
pub mod error;
pub mod installer;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod players;
pub mod storage;
pub mod tasks;
pub mod text_summary;
