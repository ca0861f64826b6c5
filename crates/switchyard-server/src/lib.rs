#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod health;
mod providers;
mod request_context;

use std::{net::SocketAddr, sync::Arc};

use axum::{Router, extract::DefaultBodyLimit};
use switchyard_config::Config;
use switchyard_health::{HealthTracker, PersistenceJob, ProviderStateRegistry, store};
use switchyard_relay::{RelayState, UsageLogger};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    registry: Arc<ProviderStateRegistry>,
    persistence: Option<PersistenceJob>,
}

impl Server {
    /// Build the server from configuration
    ///
    /// Restores persisted provider state before any route is reachable, so
    /// the first requests already see known-bad providers.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let registry = Arc::new(ProviderStateRegistry::new());
        let tracker = Arc::new(HealthTracker::new(Arc::clone(&registry), &config.health));

        let persistence = match store::from_config(&config.persistence)? {
            Some(state_store) => {
                let job = PersistenceJob::new(Arc::clone(&registry), state_store, config.persistence.flush_interval);
                job.restore().await;
                Some(job)
            }
            None => None,
        };

        let logger = UsageLogger::spawn(&config.usage_log).await?;
        let relay_state = RelayState::from_config(&config, tracker, logger)?;

        let mut app = Router::new();

        // Health check
        if config.server.health.enabled {
            app = app.route(&config.server.health.path, axum::routing::get(health::health_handler));
        }

        // Provider state diagnostics
        if config.server.expose_provider_state {
            app = app.route(
                "/internal/providers",
                axum::routing::get(providers::providers_handler).with_state(Arc::clone(&registry)),
            );
        }

        // Relay routes
        app = app.merge(switchyard_relay::relay_router(relay_state));

        // Apply middleware layers (innermost first)
        app = app.layer(axum::middleware::from_fn(request_context::request_context_middleware));
        app = app.layer(DefaultBodyLimit::max(config.server.request_body_limit));
        app = app.layer(TraceLayer::new_for_http());

        tracing::info!(
            groups = config.groups.len(),
            persistence = persistence.is_some(),
            "server initialized"
        );

        Ok(Self {
            router: app,
            listen_address,
            registry,
            persistence,
        })
    }

    /// Get the configured listen address
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Shared provider state, for diagnostics and tests
    pub fn registry(&self) -> &Arc<ProviderStateRegistry> {
        &self.registry
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener. The
    /// persistence job is not started in this mode.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered, then waits for the
    /// final provider state flush.
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        let persistence = self.persistence.map(|job| job.spawn(shutdown.clone()));

        let serve_shutdown = shutdown.clone();
        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                serve_shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await;

        // Stop the persistence job even when serving failed
        shutdown.cancel();
        if let Some(handle) = persistence
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "persistence job did not finish cleanly");
        }

        served?;
        Ok(())
    }
}
