//! Shared test utilities

pub mod registry;

pub use registry::{MockRegistry, package_json};
