//! Version layer: fetching, caching, resolving and classifying package versions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Registry  │────▶│  Resolver   │────▶│ Classifier  │
//! │  (fetch)    │     │ (latest x3) │     │  (tiers)    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                   │
//!        ▼                   ▼
//! ┌─────────────┐     ┌─────────────┐
//! │  Registries │     │    Cache    │
//! │    (npm)    │     │ (TTL/scope) │
//! └─────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: In-memory TTL cache keyed by scope, package and version
//! - [`classifier`]: Upgrade tier classification
//! - [`registry`]: Registry trait for fetching metadata from remote sources
//! - [`registries`]: Concrete registry implementations (npm)
//! - [`resolver`]: Latest major/minor/patch resolution with pre-release policy
//! - [`error`]: Error types for registry operations
//! - [`semver`]: Shared semver utilities
//! - [`types`]: Common types like `VersionInfo`

pub mod cache;
pub mod classifier;
pub mod error;
pub mod registries;
pub mod registry;
pub mod resolver;
pub mod semver;
pub mod types;
