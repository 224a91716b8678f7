//! Grid server listener
//!
//! Binds the HTTP listener, owns the shared state every handler works
//! against, and coordinates shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::compositor::Compositor;
use crate::control::ControlRelay;
use crate::error::Result;
use crate::ingest::IngestContext;
use crate::publisher::{StreamPublisher, WorkerPool};
use crate::registry::ClientRegistry;
use crate::server::config::ServerConfig;
use crate::stats::ServerMetrics;

/// State shared by every connection handler
pub(crate) struct ServerState {
    pub(crate) config: ServerConfig,
    pub(crate) registry: Arc<ClientRegistry>,
    pub(crate) relay: Arc<ControlRelay>,
    pub(crate) metrics: Arc<ServerMetrics>,
    pub(crate) compositor: Arc<Compositor>,
    pub(crate) pool: WorkerPool,
    pub(crate) cancel: CancellationToken,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl ServerState {
    /// Allocate a session id (ingest connections and viewers share the sequence)
    pub(crate) fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Reserve an ingest connection slot
    ///
    /// `Err` when the connection limit is reached; `Ok(None)` when unlimited.
    pub(crate) fn try_admit(&self) -> std::result::Result<Option<OwnedSemaphorePermit>, ()> {
        match self.connection_semaphore {
            Some(ref sem) => sem.clone().try_acquire_owned().map(Some).map_err(|_| ()),
            None => Ok(None),
        }
    }

    pub(crate) fn ingest_context(&self) -> IngestContext {
        IngestContext {
            registry: Arc::clone(&self.registry),
            relay: Arc::clone(&self.relay),
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub(crate) fn publisher(&self, viewer_id: u64) -> StreamPublisher {
        StreamPublisher::new(
            viewer_id,
            Arc::clone(&self.registry),
            Arc::clone(&self.compositor),
            self.pool.clone(),
            self.config.publish_interval(),
        )
        .with_metrics(Arc::clone(&self.metrics))
    }
}

/// Camera grid server
///
/// Serves `/ws` for frame sources and controllers, `/video` for viewers and
/// `/api/status` for monitoring.
pub struct GridServer {
    state: Arc<ServerState>,
}

impl GridServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let state = ServerState {
            registry: Arc::new(ClientRegistry::with_config(config.registry_config())),
            relay: Arc::new(ControlRelay::with_policy(config.control_policy)),
            metrics: Arc::new(ServerMetrics::new()),
            compositor: Arc::new(config.compositor()),
            pool: WorkerPool::new(config.worker_threads),
            cancel: CancellationToken::new(),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
            config,
        };

        Self {
            state: Arc::new(state),
        }
    }

    /// Get a reference to the client registry
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.state.registry
    }

    /// Get a reference to the control relay
    pub fn relay(&self) -> &Arc<ControlRelay> {
        &self.state.relay
    }

    /// Get a reference to the server counters
    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.state.metrics
    }

    /// Get the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.cancel.clone()
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.state.config.bind_addr
    }

    /// Bind the configured address
    ///
    /// A bind failure is fatal to startup.
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.state.config.bind_addr).await?;
        Ok(listener)
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down through
    /// [`shutdown_token`](Self::shutdown_token).
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future + Send + 'static,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes
    ///
    /// On shutdown: new connections are refused, ingest sessions close,
    /// publishers stop within one pacing interval, and in-flight compositor
    /// jobs get the configured grace period before the call returns.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let addr = listener.local_addr()?;
        tracing::info!(
            addr = %addr,
            workers = state.pool.size(),
            fps = state.config.publish_rate,
            "Grid server listening"
        );

        let cleanup_handle = state
            .registry
            .spawn_cleanup_task(Arc::clone(&state.relay), state.cancel.clone());

        let cancel = state.cancel.clone();
        let signal = async move {
            tokio::select! {
                _ = shutdown => {
                    tracing::info!("Shutdown signal received");
                }
                _ = cancel.cancelled() => {}
            }
            cancel.cancel();
        };

        let app = super::router(Arc::clone(&state));
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await;

        // Serving can also end with an I/O error; make sure everything stops
        state.cancel.cancel();
        if let Some(handle) = cleanup_handle {
            let _ = handle.await;
        }

        let drained = state.pool.shutdown(state.config.shutdown_grace).await;
        tracing::info!(drained, "Grid server stopped");

        result?;
        Ok(())
    }
}
