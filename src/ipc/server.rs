//! Unix domain socket server for IPC
//!
//! Bridges the platform shim into the daemon: call-state changes and
//! permission results come in as requests, recorder events go out as push
//! notifications to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::authorization::{AuthorizationResult, DialogAttachment, PermissionBroker};
use crate::controller::ControlCommand;
use crate::events::RecorderEvent;
use crate::telephony::{CallStateEvent, TelephonyBridge};

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_MESSAGE_LEN};

/// Handles into the rest of the daemon that client requests feed
#[derive(Clone)]
pub struct PlatformLinks {
    /// Call-state changes are published here for the monitor
    pub telephony: TelephonyBridge,
    /// Records grants reported by the permission dialog
    pub permissions: PermissionBroker,
    /// Permission results are forwarded to the controller here
    pub commands: mpsc::UnboundedSender<ControlCommand>,
    /// Recorder events pushed to subscribers
    pub events: broadcast::Sender<RecorderEvent>,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    links: PlatformLinks,
    shutdown_tx: broadcast::Sender<()>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

/// Notification task of one subscribed client, aborted when the client
/// handler goes away for any reason
struct Forwarder(JoinHandle<()>);

impl Drop for Forwarder {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, status: DaemonStatus, links: PlatformLinks) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status,
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            links,
            shutdown_tx,
        })
    }

    /// Fold a recorder event into the reported status
    pub async fn apply_event(&self, event: &RecorderEvent) {
        let mut server_state = self.state.write().await;
        let old_state = server_state.status.state;
        server_state.status.apply(event);

        let new_state = server_state.status.state;
        if old_state != new_state {
            info!(
                from = ?old_state,
                to = ?new_state,
                "IPC server: recorder state updated"
            );
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let links = self.links.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, links) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        links: PlatformLinks,
    ) -> Result<()> {
        let (mut reader, writer) = stream.into_split();
        let writer: SharedWriter = Arc::new(Mutex::new(writer));
        let mut forwarder: Option<Forwarder> = None;

        while let Some(msg_buf) = Self::read_message(&mut reader).await? {
            let response = match serde_json::from_slice::<Request>(&msg_buf) {
                Ok(request) => {
                    debug!(?request, "received request");

                    // Subscribe before answering so no event slips between
                    let subscribe = matches!(request, Request::Subscribe);
                    if subscribe && forwarder.is_none() {
                        forwarder = Some(Self::spawn_forwarder(
                            links.events.subscribe(),
                            Arc::clone(&writer),
                            links.permissions.attach_dialog(),
                        ));
                        debug!("client subscribed to notifications");
                    }

                    Self::process_request(request, &state, &links).await
                }
                Err(e) => {
                    warn!(error = %e, "malformed request");
                    Response::error("bad_request", e.to_string())
                }
            };

            let mut guard = writer.lock().await;
            Self::send_message(&mut *guard, &response).await?;
        }

        debug!("client disconnected");
        Ok(())
    }

    /// Read one length-prefixed message, `None` on a clean disconnect
    async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];

        // Read message length (4-byte little-endian)
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_LEN {
            warn!(len, "message too large, disconnecting");
            return Ok(None);
        }

        // Read message body
        let mut msg_buf = vec![0u8; len];
        reader.read_exact(&mut msg_buf).await?;
        Ok(Some(msg_buf))
    }

    /// Send a length-prefixed JSON message
    async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: serde::Serialize,
    {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Push recorder events to one subscribed client until it goes away
    fn spawn_forwarder(
        mut event_rx: broadcast::Receiver<RecorderEvent>,
        writer: SharedWriter,
        dialog: DialogAttachment,
    ) -> Forwarder {
        Forwarder(tokio::spawn(async move {
            let _dialog = dialog;
            loop {
                match event_rx.recv().await {
                    Ok(event) => {
                        let notification = Notification::RecorderEvent { event };
                        let mut guard = writer.lock().await;
                        if let Err(e) = Self::send_message(&mut *guard, &notification).await {
                            debug!(?e, "subscriber gone");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }

    /// Process a request and return a response
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
        links: &PlatformLinks,
    ) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                state.status.permission_granted = links.permissions.granted();
                Response::Status(state.status.clone())
            }

            Request::CallState {
                raw_state,
                counterparty,
            } => {
                let event = CallStateEvent {
                    raw_state,
                    counterparty,
                };
                if links.telephony.publish(&event) == 0 {
                    warn!(raw_state, "no call-state monitor registered");
                }
                Response::Accepted
            }

            Request::AuthorizationResult { token, grants } => {
                let result = AuthorizationResult { token, grants };
                links.permissions.record(&result);

                match links
                    .commands
                    .send(ControlCommand::AuthorizationResult(result))
                {
                    Ok(()) => Response::Accepted,
                    Err(_) => Response::error("controller_closed", "recording controller stopped"),
                }
            }

            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::{Authorizer, Capability, CapabilityGrant, RequestToken};
    use crate::ipc::protocol::RecorderMode;
    use crate::telephony::{codes, CallStateMonitor};

    struct Harness {
        _dir: tempfile::TempDir,
        socket_path: PathBuf,
        server: Arc<Server>,
        command_rx: mpsc::UnboundedReceiver<ControlCommand>,
        links: PlatformLinks,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("daemon.sock");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(16);
        let telephony = TelephonyBridge::new();
        CallStateMonitor::new(command_tx.clone()).register(&telephony);

        let links = PlatformLinks {
            telephony,
            permissions: PermissionBroker::new(event_tx.clone()),
            commands: command_tx,
            events: event_tx,
        };
        let status = DaemonStatus::new(dir.path().join("call.3gp"), RecorderMode::Idle);
        let server = Arc::new(Server::new(&socket_path, status, links.clone()).unwrap());

        let running = Arc::clone(&server);
        tokio::spawn(async move {
            let _ = running.run().await;
        });

        Harness {
            _dir: dir,
            socket_path,
            server,
            command_rx,
            links,
        }
    }

    async fn roundtrip(stream: &mut UnixStream, request: &Request) -> Response {
        Server::send_message(stream, request).await.unwrap();
        let body = Server::read_message(stream).await.unwrap().unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let h = harness();
        let mut stream = UnixStream::connect(&h.socket_path).await.unwrap();

        assert_eq!(roundtrip(&mut stream, &Request::Ping).await, Response::Pong);
    }

    #[tokio::test]
    async fn test_call_state_reaches_controller_channel() {
        let mut h = harness();
        let mut stream = UnixStream::connect(&h.socket_path).await.unwrap();

        let response = roundtrip(
            &mut stream,
            &Request::CallState {
                raw_state: codes::OFFHOOK,
                counterparty: Some("+15551234567".to_string()),
            },
        )
        .await;

        assert_eq!(response, Response::Accepted);
        assert_eq!(h.command_rx.try_recv().unwrap(), ControlCommand::Activate);
    }

    #[tokio::test]
    async fn test_authorization_result_records_grant_and_forwards() {
        let mut h = harness();
        let mut stream = UnixStream::connect(&h.socket_path).await.unwrap();

        let grants = vec![CapabilityGrant {
            capability: Capability::RecordAudio,
            granted: true,
        }];
        let response = roundtrip(
            &mut stream,
            &Request::AuthorizationResult {
                token: RequestToken::FIRST,
                grants: grants.clone(),
            },
        )
        .await;

        assert_eq!(response, Response::Accepted);
        assert!(h.links.permissions.granted());
        assert_eq!(
            h.command_rx.try_recv().unwrap(),
            ControlCommand::AuthorizationResult(AuthorizationResult {
                token: RequestToken::FIRST,
                grants,
            })
        );
    }

    #[tokio::test]
    async fn test_malformed_request_keeps_connection() {
        let h = harness();
        let mut stream = UnixStream::connect(&h.socket_path).await.unwrap();

        let garbage = br#"{"type":"launch_missiles"}"#;
        stream
            .write_all(&(garbage.len() as u32).to_le_bytes())
            .await
            .unwrap();
        stream.write_all(garbage).await.unwrap();
        let body = Server::read_message(&mut stream).await.unwrap().unwrap();
        let response: Response = serde_json::from_slice(&body).unwrap();
        assert!(matches!(response, Response::Error { ref code, .. } if code == "bad_request"));

        assert_eq!(roundtrip(&mut stream, &Request::Ping).await, Response::Pong);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let h = harness();
        let mut stream = UnixStream::connect(&h.socket_path).await.unwrap();

        assert_eq!(
            roundtrip(&mut stream, &Request::Subscribe).await,
            Response::Subscribed
        );

        let event = RecorderEvent::AuthorizationRequested {
            token: RequestToken::FIRST,
            capability: Capability::RecordAudio,
        };
        h.links.events.send(event.clone()).unwrap();

        let body = Server::read_message(&mut stream).await.unwrap().unwrap();
        let notification: Notification = serde_json::from_slice(&body).unwrap();
        assert_eq!(notification, Notification::RecorderEvent { event });
    }

    #[tokio::test]
    async fn test_status_reflects_applied_events() {
        let h = harness();
        h.server
            .apply_event(&RecorderEvent::AuthorizationRequested {
                token: RequestToken::FIRST,
                capability: Capability::RecordAudio,
            })
            .await;

        let mut stream = UnixStream::connect(&h.socket_path).await.unwrap();
        let Response::Status(status) = roundtrip(&mut stream, &Request::GetStatus).await else {
            panic!("expected status response");
        };
        assert_eq!(status.state, RecorderMode::AwaitingAuthorization);
        assert!(!status.permission_granted);
    }

    #[tokio::test]
    async fn test_authorization_result_after_controller_stopped() {
        let h = harness();
        drop(h.command_rx);
        let mut stream = UnixStream::connect(&h.socket_path).await.unwrap();

        let response = roundtrip(
            &mut stream,
            &Request::AuthorizationResult {
                token: RequestToken::FIRST,
                grants: vec![CapabilityGrant {
                    capability: Capability::RecordAudio,
                    granted: true,
                }],
            },
        )
        .await;

        assert!(matches!(response, Response::Error { ref code, .. } if code == "controller_closed"));
        assert!(h.links.permissions.granted());
    }

    #[tokio::test]
    async fn test_oversized_message_disconnects() {
        let h = harness();
        let mut stream = UnixStream::connect(&h.socket_path).await.unwrap();

        let len = (MAX_MESSAGE_LEN as u32 + 1).to_le_bytes();
        stream.write_all(&len).await.unwrap();

        let reply = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            Server::read_message(&mut stream),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(reply.is_none());
    }

    async fn wait_for_dialogs(links: &PlatformLinks, expected: usize) {
        for _ in 0..100 {
            if links.permissions.dialogs_attached() == expected {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!(
            "expected {expected} attached dialogs, found {}",
            links.permissions.dialogs_attached()
        );
    }

    #[tokio::test]
    async fn test_subscriber_hosts_permission_dialog() {
        let h = harness();
        let mut broker = h.links.permissions.clone();
        assert!(broker
            .request(RequestToken::FIRST, Capability::RecordAudio)
            .is_err());

        let mut stream = UnixStream::connect(&h.socket_path).await.unwrap();
        roundtrip(&mut stream, &Request::Subscribe).await;
        assert_eq!(h.links.permissions.dialogs_attached(), 1);
        broker
            .request(RequestToken::FIRST.next(), Capability::RecordAudio)
            .unwrap();

        drop(stream);
        wait_for_dialogs(&h.links, 0).await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_forwarders() {
        let h = harness();
        let mut stream = UnixStream::connect(&h.socket_path).await.unwrap();
        roundtrip(&mut stream, &Request::Subscribe).await;
        assert_eq!(h.links.permissions.dialogs_attached(), 1);

        h.server.shutdown().await;

        wait_for_dialogs(&h.links, 0).await;
        let closed = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            Server::read_message(&mut stream),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(closed.is_none());
    }

    #[test]
    fn test_shutdown_removes_socket() {
        tokio_test::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let socket_path = dir.path().join("daemon.sock");
            let (command_tx, _command_rx) = mpsc::unbounded_channel();
            let (event_tx, _) = broadcast::channel(4);
            let links = PlatformLinks {
                telephony: TelephonyBridge::new(),
                permissions: PermissionBroker::new(event_tx.clone()),
                commands: command_tx,
                events: event_tx,
            };
            let status = DaemonStatus::new(dir.path().join("call.3gp"), RecorderMode::Idle);

            let server = Server::new(&socket_path, status, links).unwrap();
            assert!(socket_path.exists());

            server.shutdown().await;
            assert!(!socket_path.exists());
        });
    }
}
