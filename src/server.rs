//! Reusable OCPP Central System server runtime.
//!
//! Provides [`ServerHandle`] that encapsulates the full server lifecycle:
//! store selection and migrations, the OCPP WebSocket server, and graceful
//! shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::application::actions::{ActionRegistry, SessionServices};
use crate::application::persistence::StoreWriter;
use crate::application::session::{SessionRegistry, SharedSessionRegistry};
use crate::config::{AppConfig, StoreBackend};
use crate::domain::{Store, TransactionIdGenerator};
use crate::infrastructure::database::open_storage;
use crate::infrastructure::storage::{InMemoryStore, RetryingStore};
use crate::interfaces::ws::OcppServer;
use crate::support::errors::{ServerError, StoreError};
use crate::support::shutdown::{listen_for_shutdown_signals, ShutdownSignal};

// ── Options ────────────────────────────────────────────────────────

/// Options for starting the OCPP Central System.
#[derive(Default)]
pub struct ServerOptions {
    /// Application configuration.
    pub config: AppConfig,
    /// Use this store instead of the one the configuration selects.
    pub store: Option<Arc<dyn Store>>,
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running OCPP Central System.
///
/// # Examples
///
/// ```rust,no_run
/// use ocpp_central::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     // ... wait for shutdown signal ...
///     handle.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    /// The Store every session writes to.
    pub store: Arc<dyn Store>,
    /// Active WebSocket session registry.
    pub session_registry: SharedSessionRegistry,
    /// The configuration the server was started with.
    pub config: AppConfig,

    local_addr: SocketAddr,
    shutdown: ShutdownSignal,
    ws_task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Start the OCPP Central System with the given options.
    ///
    /// This will:
    /// 1. Open the configured Store (running migrations for SQLite)
    /// 2. Seed the transaction ID generator from the Store
    /// 3. Bind and start the OCPP WebSocket server
    pub async fn start(opts: ServerOptions) -> Result<Self, ServerError> {
        let config = opts.config;
        config.validate()?;

        info!("Starting OCPP Central System...");

        let store = match opts.store {
            Some(store) => store,
            None => open_store(&config).await?,
        };

        let last_id = store.last_transaction_id().await?;
        let ids = Arc::new(TransactionIdGenerator::after(last_id));
        info!(last_transaction_id = ?last_id, "Transaction ID generator seeded");

        let session_registry = SessionRegistry::shared();
        let services = SessionServices {
            writer: StoreWriter::new(store.clone(), config.store_ack_timeout()),
            ids,
            heartbeat_interval: config.ocpp.heartbeat_interval,
        };

        let shutdown = ShutdownSignal::new();
        let server = OcppServer::new(
            config.address(),
            session_registry.clone(),
            Arc::new(ActionRegistry::ocpp16()),
            services,
            config.call_timeout(),
        )
        .with_shutdown(shutdown.clone(), config.shutdown_timeout());

        let listener = TcpListener::bind(config.address()).await?;
        let local_addr = listener.local_addr()?;

        let ws_task = tokio::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                error!("WebSocket server error: {}", e);
            }
        });

        Ok(Self {
            store,
            session_registry,
            config,
            local_addr,
            shutdown,
            ws_task,
        })
    }

    /// Address the WebSocket server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get a cloneable shutdown signal.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        tokio::spawn(listen_for_shutdown_signals(self.shutdown.clone()));
    }

    /// Trigger graceful shutdown (non-blocking).
    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait for the server to fully stop after shutdown has been triggered.
    pub async fn wait(self) {
        info!("⏳ Waiting for server tasks to complete...");
        match self.ws_task.await {
            Ok(()) => info!("WebSocket server stopped"),
            Err(e) => error!("WebSocket server task panicked: {}", e),
        }
        info!("👋 OCPP Central System shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down OCPP Central System...");
        self.trigger_shutdown();
        self.wait().await;
    }

    /// Check if the server is still running.
    pub fn is_running(&self) -> bool {
        !self.ws_task.is_finished()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Build the Store the configuration asks for.
async fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>, ServerError> {
    let store: Arc<dyn Store> = match config.store.backend {
        StoreBackend::Memory => {
            info!("Store: in-memory");
            Arc::new(InMemoryStore::new())
        }
        StoreBackend::Sqlite => {
            let db_config = config.database_config();
            info!("Store: {}", db_config.url);
            let storage = open_storage(&db_config).await.map_err(StoreError::from)?;
            Arc::new(RetryingStore::new(storage, config.retry_config()))
        }
    };
    Ok(store)
}

/// Initialize tracing (logging) from the application config.
///
/// Call this once at process startup (before [`ServerHandle::start`]).
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
