pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod parser;
pub mod queue;
pub mod version;
