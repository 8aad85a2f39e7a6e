//! OCPP 1.6 WebSocket server
//!
//! Accepts charge-point connections at `ws://<host>:<port>/ocpp/{charge_point_id}`
//! (or `/{charge_point_id}`). Each connection gets a reader task, a writer
//! task and a [`Dispatcher`] task owning the session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::application::actions::{ActionRegistry, SessionServices};
use crate::application::dispatcher::Dispatcher;
use crate::application::session::{Session, SessionCommand, SharedSessionRegistry};
use crate::support::errors::ServerError;
use crate::support::shutdown::ShutdownSignal;

/// OCPP 1.6 WebSocket subprotocol
const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

/// Outbound commands a session buffers before senders have to wait
const COMMAND_BUFFER: usize = 32;

/// Everything a connection task needs, cloned per connection.
#[derive(Clone)]
struct ConnectionContext {
    registry: SharedSessionRegistry,
    actions: Arc<ActionRegistry>,
    services: SessionServices,
    call_timeout: Duration,
}

/// OCPP WebSocket Server
pub struct OcppServer {
    address: String,
    context: ConnectionContext,
    shutdown_signal: Option<ShutdownSignal>,
    shutdown_timeout: Duration,
}

impl OcppServer {
    pub fn new(
        address: impl Into<String>,
        registry: SharedSessionRegistry,
        actions: Arc<ActionRegistry>,
        services: SessionServices,
        call_timeout: Duration,
    ) -> Self {
        Self {
            address: address.into(),
            context: ConnectionContext {
                registry,
                actions,
                services,
                call_timeout,
            },
            shutdown_signal: None,
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    /// Set the shutdown signal for graceful shutdown
    pub fn with_shutdown(mut self, signal: ShutdownSignal, drain_timeout: Duration) -> Self {
        self.shutdown_signal = Some(signal);
        self.shutdown_timeout = drain_timeout;
        self
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.address).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        info!("🔌 OCPP 1.6 Central System started on ws://{}", addr);
        info!(
            "   Charge points should connect to: ws://{}/ocpp/{{charge_point_id}}",
            addr
        );

        let shutdown = self.shutdown_signal.clone().unwrap_or_default();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => error!(error = %e, "Failed to accept connection"),
                    }
                }
                _ = shutdown.wait() => {
                    info!("🛑 WebSocket server received shutdown signal");
                    self.graceful_shutdown().await;
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let context = self.context.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, context).await {
                error!(%addr, error = %e, "Connection error");
            }
        });
    }

    async fn graceful_shutdown(&self) {
        let registry = &self.context.registry;
        let count = registry.count();
        if count > 0 {
            info!("📢 Closing {} charge point sessions...", count);
            registry.close_all();
        }

        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while registry.count() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = registry.count(),
                "Sessions still open after shutdown timeout"
            );
        }

        info!("✅ WebSocket server shutdown complete");
    }

    pub fn session_registry(&self) -> &SharedSessionRegistry {
        &self.context.registry
    }
}

/// Extract charge point ID from WebSocket request path.
/// Expected format: /ocpp/{charge_point_id} or /{charge_point_id}
fn extract_charge_point_id(path: &str) -> Option<String> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let id = path.strip_prefix("ocpp/").unwrap_or(path).trim_matches('/');

    if id.is_empty() || id == "ocpp" || id.contains('/') {
        return None;
    }
    Some(id.to_string())
}

fn offers_ocpp16(requested_protocols: &str) -> bool {
    requested_protocols
        .split(',')
        .map(|s| s.trim())
        .any(|p| p == OCPP_SUBPROTOCOL)
}

/// Handle a single WebSocket connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    context: ConnectionContext,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    debug!(%addr, "New connection");

    let mut charge_point_id: Option<String> = None;

    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, mut response: Response| {
            let path = req.uri().path();

            let requested_protocols = req
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");

            if offers_ocpp16(requested_protocols) {
                response.headers_mut().insert(
                    "Sec-WebSocket-Protocol",
                    HeaderValue::from_static(OCPP_SUBPROTOCOL),
                );
            } else {
                warn!(
                    %addr,
                    path,
                    requested = requested_protocols,
                    "Client did not offer ocpp1.6, continuing without a subprotocol"
                );
            }

            charge_point_id = extract_charge_point_id(path);
            Ok(response)
        },
    )
    .await?;

    let charge_point_id = charge_point_id.unwrap_or_else(|| format!("CP_{}", addr.port()));
    info!(charge_point_id = charge_point_id.as_str(), %addr, "Connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
    let (command_tx, command_rx) = mpsc::channel::<SessionCommand>(COMMAND_BUFFER);

    let handle = context.registry.register(&charge_point_id, command_tx);

    let dispatcher = Dispatcher::new(
        Session::new(charge_point_id.clone(), context.call_timeout),
        context.actions.clone(),
        context.services.clone(),
    );
    let mut dispatch_task = tokio::spawn(dispatcher.run(inbound_rx, outbound_tx, command_rx));

    // Outgoing message sender task
    let cp_id_send = charge_point_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            debug!(charge_point_id = cp_id_send.as_str(), "-> {}", msg);
            if let Err(e) = ws_sender.send(Message::Text(msg)).await {
                error!(charge_point_id = cp_id_send.as_str(), error = %e, "Send error");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    // Incoming message receiver task
    let cp_id_recv = charge_point_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    debug!(charge_point_id = cp_id_recv.as_str(), "<- {}", text);
                    if inbound_tx.send(text).is_err() {
                        break;
                    }
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(frame)) => {
                    info!(charge_point_id = cp_id_recv.as_str(), ?frame, "Close frame received");
                    break;
                }
                Ok(Message::Binary(data)) => {
                    warn!(
                        charge_point_id = cp_id_recv.as_str(),
                        bytes = data.len(),
                        "Binary message received, ignoring"
                    );
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => {
                    warn!(charge_point_id = cp_id_recv.as_str(), error = %e, "WebSocket error");
                    break;
                }
            }
        }
    });

    // Either side may end the connection first.
    tokio::select! {
        _ = &mut recv_task => {
            let _ = dispatch_task.await;
        }
        _ = &mut dispatch_task => {
            recv_task.abort();
        }
    }
    let _ = send_task.await;

    context
        .registry
        .unregister(&charge_point_id, handle.connection_id());
    info!(charge_point_id = charge_point_id.as_str(), "Disconnected");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::persistence::StoreWriter;
    use crate::application::session::SessionRegistry;
    use crate::domain::TransactionIdGenerator;
    use crate::infrastructure::storage::InMemoryStore;
    use crate::support::ocpp_frame::OcppFrame;
    use serde_json::json;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    #[test]
    fn charge_point_id_from_path() {
        assert_eq!(extract_charge_point_id("/ocpp/CP001"), Some("CP001".into()));
        assert_eq!(extract_charge_point_id("/CP001"), Some("CP001".into()));
        assert_eq!(extract_charge_point_id("/ocpp/CP001/"), Some("CP001".into()));
        assert_eq!(extract_charge_point_id("/"), None);
        assert_eq!(extract_charge_point_id("/ocpp/"), None);
        assert_eq!(extract_charge_point_id("/ocpp"), None);
        assert_eq!(extract_charge_point_id("//ocpp//"), None);
        assert_eq!(extract_charge_point_id("/ocpp/ocpp1"), Some("ocpp1".into()));
        assert_eq!(extract_charge_point_id("/a/b"), None);
    }

    #[test]
    fn subprotocol_offer_detection() {
        assert!(offers_ocpp16("ocpp1.6"));
        assert!(offers_ocpp16("ocpp2.0.1, ocpp1.6"));
        assert!(!offers_ocpp16("ocpp2.0.1"));
        assert!(!offers_ocpp16(""));
    }

    #[tokio::test]
    async fn boot_notification_over_websocket() {
        let store = Arc::new(InMemoryStore::new());
        let registry = SessionRegistry::shared();
        let services = SessionServices {
            writer: StoreWriter::new(store.clone(), Duration::from_millis(500)),
            ids: Arc::new(TransactionIdGenerator::new()),
            heartbeat_interval: 10,
        };
        let shutdown = ShutdownSignal::new();
        let server = OcppServer::new(
            "127.0.0.1:0",
            registry.clone(),
            Arc::new(ActionRegistry::ocpp16()),
            services,
            Duration::from_secs(30),
        )
        .with_shutdown(shutdown.clone(), Duration::from_secs(2));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server_task = tokio::spawn(async move { server.serve(listener).await });

        let mut request = format!("ws://127.0.0.1:{}/ocpp/CP042", port)
            .into_client_request()
            .unwrap();
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("ocpp1.6"));
        let (mut ws, response) = tokio_tungstenite::connect_async(request).await.unwrap();
        assert_eq!(
            response.headers().get("Sec-WebSocket-Protocol").unwrap(),
            "ocpp1.6"
        );

        let boot = json!([2, "b1", "BootNotification", {"chargePointModel": "X1", "chargePointVendor": "Acme"}]);
        ws.send(Message::Text(boot.to_string())).await.unwrap();

        let reply = loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => break OcppFrame::parse(&text).unwrap(),
                _ => continue,
            }
        };
        assert_eq!(reply.unique_id(), "b1");
        assert!(reply.is_call_result());
        assert!(registry.is_connected("CP042"));
        assert_eq!(store.boots()[0].charge_point_id, "CP042");

        shutdown.trigger();
        server_task.await.unwrap().unwrap();
        assert_eq!(registry.count(), 0);
    }
}
