//! Registry trait for fetching package metadata from a remote source

#[cfg(test)]
use mockall::automock;

use crate::version::error::RegistryError;
use crate::version::types::RegistryMetadata;

/// Trait for fetching package metadata from a registry
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Fetches the `latest` tag and all published versions for a package
    ///
    /// # Arguments
    /// * `package_name` - The name of the package (e.g., "lodash" or "@types/node")
    ///
    /// # Returns
    /// * `Ok(RegistryMetadata)` - Latest tag and the published version set
    /// * `Err(RegistryError)` - If the fetch fails or the payload is malformed
    async fn fetch_registry_metadata(
        &self,
        package_name: &str,
    ) -> Result<RegistryMetadata, RegistryError>;
}
