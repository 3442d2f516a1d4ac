//! Start-up and teardown of the pipeline's background pieces

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::orchestrator::FetchOrchestrator;
use crate::version::cache::spawn_sweeper;
use crate::version::registry::Registry;

pub struct Pipeline;

impl Pipeline {
    /// Build an orchestrator and start the cache sweeper
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: PipelineConfig, registry: Arc<dyn Registry>) -> PipelineHandle {
        let sweep_interval = Duration::from_millis(config.cache.sweep_interval_ms.max(1));
        let orchestrator = Arc::new(FetchOrchestrator::new(config, registry));

        let sweeper = spawn_sweeper(
            Arc::clone(orchestrator.cache()),
            sweep_interval,
            orchestrator.root_token().child_token(),
        );

        info!(
            "Pipeline started: {} concurrent requests, cache ttl {:?}",
            orchestrator.queue().max_concurrent(),
            orchestrator.cache().ttl()
        );
        PipelineHandle {
            orchestrator,
            sweeper: Some(sweeper),
        }
    }
}

/// Owns everything [`Pipeline::start`] set in motion
///
/// Dropping the handle without calling [`shutdown`](PipelineHandle::shutdown)
/// still cancels in-flight passes and the sweeper, but does not wait for them.
pub struct PipelineHandle {
    orchestrator: Arc<FetchOrchestrator>,
    sweeper: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn orchestrator(&self) -> &Arc<FetchOrchestrator> {
        &self.orchestrator
    }

    /// Cancel every pass, reject waiting requests and stop the sweeper
    pub async fn shutdown(mut self) {
        self.orchestrator.shutdown();
        if let Some(sweeper) = self.sweeper.take()
            && let Err(e) = sweeper.await
        {
            warn!("Cache sweeper ended abnormally: {}", e);
        }
        info!("Pipeline stopped");
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if self.sweeper.is_some() {
            self.orchestrator.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::orchestrator::{DependencyOutcome, ResolveRequest};
    use crate::parser::types::Dependency;
    use crate::version::registry::MockRegistry;
    use crate::version::types::{RegistryMetadata, VersionInfo};

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_on_configured_interval() {
        let config = PipelineConfig {
            cache: CacheConfig {
                ttl_ms: 1_000,
                sweep_interval_ms: 5_000,
            },
            ..PipelineConfig::default()
        };
        let handle = Pipeline::start(config, Arc::new(MockRegistry::new()));
        let cache = Arc::clone(handle.orchestrator().cache());
        cache.set("doc", "lodash", "1.0.0", VersionInfo::unchanged("1.0.0"));

        tokio::time::sleep(Duration::from_millis(5_100)).await;

        assert!(cache.is_empty());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_cancels_passes_started_afterwards() {
        let mut registry = MockRegistry::new();
        registry.expect_fetch_registry_metadata().never();
        let handle = Pipeline::start(PipelineConfig::default(), Arc::new(registry));
        let orchestrator = Arc::clone(handle.orchestrator());

        handle.shutdown().await;

        let report = orchestrator
            .resolve_scope(ResolveRequest::new(
                "doc",
                vec![Dependency::new("lodash", "1.0.0", 2, 10)],
            ))
            .await;
        assert_eq!(report.outcome_of("lodash"), Some(&DependencyOutcome::Cancelled));
    }

    #[tokio::test]
    async fn shutdown_waits_for_sweeper() {
        let mut registry = MockRegistry::new();
        registry
            .expect_fetch_registry_metadata()
            .returning(|_| Ok(RegistryMetadata::new("1.0.0", vec!["1.0.0".to_string()])));
        let handle = Pipeline::start(PipelineConfig::default(), Arc::new(registry));

        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .unwrap();
    }
}
