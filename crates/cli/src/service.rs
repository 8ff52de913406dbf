//! Service wiring: collaborators, dispatch pool and router from configuration

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tracing::{info, instrument};

use collaborators::{FileEnvelopeStorage, HttpClientFactory, Iso20022Inspector, Ledger, MappingResolver};
use contracts::ServiceConfig;
use dispatcher::{DispatchCoordinator, DispatchPolicy, DispatchPool, MetricsSnapshot};
use gateway::AppState;

use crate::error::CliError;

/// Running service parts
pub struct Service {
    pub router: Router,
    pub pool: DispatchPool,
    pub shutdown_grace: Duration,
}

impl Service {
    /// Build every collaborator and start the dispatch pool.
    ///
    /// Must run inside the tokio runtime.
    #[instrument(
        name = "service_build",
        skip(config),
        fields(targets = config.targets.len(), workers = config.dispatch.workers)
    )]
    pub fn build(config: &ServiceConfig) -> Result<Self> {
        let storage = FileEnvelopeStorage::new(&config.storage.base_path)
            .map_err(|e| CliError::startup("envelope storage", e))?;
        let resolver = MappingResolver::from_config(&config.mapping)
            .map_err(|e| CliError::startup("target resolver", e))?;
        let clients = HttpClientFactory::new(&config.targets)
            .map_err(|e| CliError::startup("downstream clients", e))?;
        let ledger = Arc::new(
            Ledger::from_config(&config.ledger).map_err(|e| CliError::startup("ledger", e))?,
        );

        info!(
            storage = %config.storage.base_path,
            remote_mapping = config.mapping.remote_url.is_some(),
            remote_ledger = config.ledger.url.is_some(),
            "Collaborators ready"
        );

        let coordinator = Arc::new(DispatchCoordinator::new(
            Arc::new(storage),
            Arc::new(resolver),
            Arc::new(clients),
            Arc::clone(&ledger),
            DispatchPolicy::from_config(&config.dispatch),
        ));
        let pool = DispatchPool::start(
            coordinator,
            config.dispatch.workers,
            config.dispatch.queue_capacity,
        );

        let state = AppState::new(Arc::new(Iso20022Inspector::new()), ledger, pool.queue());
        let router = gateway::router(state, &config.server.base_path);

        Ok(Self {
            router,
            pool,
            shutdown_grace: Duration::from_secs(config.dispatch.shutdown_grace_secs),
        })
    }

    /// Serve on `listener` until `shutdown`, then drain the pool
    pub async fn run<F>(self, listener: tokio::net::TcpListener, shutdown: F) -> Result<MetricsSnapshot>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let Self {
            router,
            pool,
            shutdown_grace,
        } = self;

        let served = gateway::serve(listener, router, shutdown).await;
        let snapshot = pool.shutdown(shutdown_grace).await;
        served?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_build_and_stop() {
        let dir = tempdir().unwrap();
        let mut config = ServiceConfig::default();
        config.storage.base_path = dir.path().join("storage").display().to_string();
        config.dispatch.workers = 2;
        config.dispatch.shutdown_grace_secs = 1;

        let service = Service::build(&config).unwrap();
        assert!(dir.path().join("storage").is_dir());
        assert!(service.pool.queue().is_accepting().await);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let snapshot = service.run(listener, async {}).await.unwrap();
        assert_eq!(snapshot.submitted, 0);
    }
}
