//! Parser layer
//! - traits.rs: ManifestParser trait definition
//! - types.rs: Common types (Dependency)
//! - package_json.rs: package.json parser

pub mod package_json;
pub mod traits;
pub mod types;

pub use package_json::PackageJsonParser;
pub use traits::{ManifestParser, ParseError};
pub use types::Dependency;
