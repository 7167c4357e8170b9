//! Provider entry point.
//!
//! A [`Provider`] is built once from the host's configuration and hands out a
//! [`ResourceOrchestrator`] per resource type. Every orchestrator shares the
//! provider's cancellation token, so [`Provider::stop`] aborts all in-flight
//! waits at once.
//!
//! # Signal Handling
//!
//! [`Provider::stop_on_signal`] waits for SIGTERM or SIGINT (CTRL+C on other
//! platforms) and then stops the provider. Waits that are cancelled this way
//! report [`ProviderError::Cancelled`]; the remote operations themselves keep
//! running and must be re-read on the next pass.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::catalog;
use crate::client::HttpControlPlane;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::orchestrator::ResourceOrchestrator;
use crate::remote::ControlPlane;
use crate::types::{Operation, ReconciliationResult};

/// Configured provider over a control plane client.
pub struct Provider<C: ?Sized = HttpControlPlane> {
    client: Arc<C>,
    config: ProviderConfig,
    cancel: CancellationToken,
}

impl Provider<HttpControlPlane> {
    /// Build a provider from the host's JSON configuration.
    ///
    /// A `null` configuration yields the defaults.
    #[instrument(skip(config), name = "provider.configure")]
    pub fn configure(config: Value) -> Result<Self, ProviderError> {
        let config = ProviderConfig::from_value(config)?;
        if config.api_key.is_none() {
            warn!("No API key configured, requests will be unauthenticated");
        }
        let client = catalog::register_endpoints(HttpControlPlane::from_config(&config)?);
        info!(base_url = %config.base_url, fast_destroy = config.fast_destroy, "Provider configured");
        Ok(Self::with_client(Arc::new(client), config))
    }
}

impl<C: ControlPlane + ?Sized> Provider<C> {
    /// Build a provider over an existing client.
    pub fn with_client(client: Arc<C>, config: ProviderConfig) -> Self {
        Self {
            client,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// An orchestrator for `resource_type`, cancelled when the provider stops.
    pub fn orchestrator(&self, resource_type: &str) -> Result<ResourceOrchestrator<C>, ProviderError> {
        let spec = catalog::spec_for(resource_type, &self.config)?;
        Ok(
            ResourceOrchestrator::new(self.client.clone(), spec, self.config.orchestrator_config())
                .with_cancellation(self.cancel.child_token()),
        )
    }

    /// Route an operation to its type's orchestrator.
    #[instrument(skip(self, operation), name = "provider.reconcile", fields(resource_type = %operation.resource_type))]
    pub async fn reconcile(&self, operation: Operation) -> ReconciliationResult {
        match self.orchestrator(&operation.resource_type) {
            Ok(orchestrator) => orchestrator.reconcile(operation).await,
            Err(e) => {
                error!(error = %e, "Cannot reconcile operation");
                ReconciliationResult::from_outcome(Err(e))
            }
        }
    }

    /// Cancel every in-flight wait.
    pub fn stop(&self) {
        info!("Stop called, cancelling in-flight waits");
        self.cancel.cancel();
    }

    /// Whether [`Provider::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for SIGTERM or SIGINT, then stop.
    pub async fn stop_on_signal(&self) -> Result<(), ProviderError> {
        wait_for_shutdown_signal().await?;
        self.stop();
        Ok(())
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// On Unix, this waits for SIGTERM or SIGINT.
/// Elsewhere, this waits for CTRL+C.
async fn wait_for_shutdown_signal() -> Result<(), ProviderError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| {
                ProviderError::Configuration(format!("failed to install {} handler: {}", name, e))
            })
        };
        let mut sigterm = install(SignalKind::terminate(), "SIGTERM")?;
        let mut sigint = install(SignalKind::interrupt(), "SIGINT")?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map_err(|e| {
            ProviderError::Configuration(format!("failed to install CTRL+C handler: {}", e))
        })?;
        info!("Received CTRL+C, shutting down");
    }

    Ok(())
}
