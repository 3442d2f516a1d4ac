//! Registry test utilities

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use version_lens::version::error::RegistryError;
use version_lens::version::registry::Registry;
use version_lens::version::types::RegistryMetadata;

/// In-memory registry with scripted rate limiting
#[derive(Default)]
pub struct MockRegistry {
    packages: HashMap<String, RegistryMetadata>,
    rate_limits: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(mut self, package: &str, latest: &str, versions: Vec<&str>) -> Self {
        self.packages.insert(
            package.to_string(),
            RegistryMetadata::new(latest, versions.into_iter().map(String::from).collect()),
        );
        self
    }

    /// Answer the next `times` requests for `package` with HTTP 429
    pub fn with_rate_limits(self, package: &str, times: usize) -> Self {
        self.rate_limits
            .lock()
            .unwrap()
            .insert(package.to_string(), times);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registry for MockRegistry {
    async fn fetch_registry_metadata(
        &self,
        package_name: &str,
    ) -> Result<RegistryMetadata, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(remaining) = self.rate_limits.lock().unwrap().get_mut(package_name)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(RegistryError::RateLimited {
                retry_after_secs: None,
            });
        }

        self.packages
            .get(package_name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(package_name.to_string()))
    }
}

/// Render a package.json with the given dependency sections
pub fn package_json(dependencies: &[(&str, &str)], dev_dependencies: &[(&str, &str)]) -> String {
    let section = |entries: &[(&str, &str)]| {
        entries
            .iter()
            .map(|(name, range)| format!("    \"{}\": \"{}\"", name, range))
            .collect::<Vec<_>>()
            .join(",\n")
    };

    format!(
        "{{\n  \"name\": \"fixture\",\n  \"dependencies\": {{\n{}\n  }},\n  \"devDependencies\": {{\n{}\n  }}\n}}\n",
        section(dependencies),
        section(dev_dependencies)
    )
}
