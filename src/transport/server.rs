//! WebSocket endpoint that feeds connections into a [`Hub`].
//!
//! Each accepted socket is upgraded, admitted under the group named by its
//! request path, and relayed: every inbound message is rebroadcast to the
//! whole group, including the sender.
//!
//! # Connection Flow
//!
//! 1. Client opens `ws://{addr}/ws/{group}`
//! 2. Paths outside the prefix are refused with `404 Not Found`
//! 3. Hub admits the connection with a generated ID
//! 4. Server sends `connection_id: {id}` to the new member
//! 5. Inbound messages are broadcast to the group until the peer leaves
//!
//! # Example
//!
//! ```no_run
//! use group_hub::Hub;
//! use group_hub::transport::GroupServer;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> group_hub::Result<()> {
//! let hub = Hub::new();
//! let server = GroupServer::builder().port(8080).bind(hub.clone()).await?;
//! println!("listening on {}", server.ws_url("lobby"));
//!
//! let root = CancellationToken::new();
//! server.run(root.child_token()).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::hub::{Client, ClientEvent, Hub};
use crate::identifiers::GroupId;

use super::websocket::WsConnection;

// ============================================================================
// Constants
// ============================================================================

/// Default path prefix in front of the group name.
pub const DEFAULT_PATH_PREFIX: &str = "/ws/";

// ============================================================================
// ServerConfig
// ============================================================================

/// Validated endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on.
    pub ip: IpAddr,

    /// Port to listen on. `0` lets the OS pick one.
    pub port: u16,

    /// Path in front of the group name. Starts and ends with `/`.
    pub path_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
        }
    }
}

// ============================================================================
// ServerBuilder
// ============================================================================

/// Builder for a [`GroupServer`].
#[derive(Debug, Default, Clone)]
pub struct ServerBuilder {
    ip: Option<IpAddr>,
    port: Option<u16>,
    path_prefix: Option<String>,
}

impl ServerBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address to listen on.
    #[inline]
    #[must_use]
    pub fn ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Sets the port to listen on.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the path in front of the group name.
    #[inline]
    #[must_use]
    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    /// Validates settings and binds the listener.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the path prefix is malformed
    /// - [`Error::Io`] if binding fails
    pub async fn bind(self, hub: Hub) -> Result<GroupServer> {
        GroupServer::bind(hub, self.validate()?).await
    }

    /// Validates settings and fills in defaults.
    fn validate(&self) -> Result<ServerConfig> {
        let defaults = ServerConfig::default();

        let path_prefix = self.path_prefix.clone().unwrap_or(defaults.path_prefix);
        if !path_prefix.starts_with('/') || !path_prefix.ends_with('/') {
            return Err(Error::config(format!(
                "path prefix must start and end with '/', got '{path_prefix}'"
            )));
        }

        Ok(ServerConfig {
            ip: self.ip.unwrap_or(defaults.ip),
            port: self.port.unwrap_or(defaults.port),
            path_prefix,
        })
    }
}

// ============================================================================
// GroupServer
// ============================================================================

/// A bound WebSocket endpoint relaying messages within groups.
pub struct GroupServer {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Address the listener is bound to.
    local_addr: SocketAddr,
    /// Registry connections are admitted into.
    hub: Hub,
    /// Path in front of the group name.
    path_prefix: String,
}

impl GroupServer {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds the listener described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(hub: Hub, config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(config.ip, config.port)).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, prefix = %config.path_prefix, "WebSocket server bound");

        Ok(Self {
            listener,
            local_addr,
            hub,
            path_prefix: config.path_prefix,
        })
    }

    /// Returns the bound socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the URL a client uses to join `group_id`.
    ///
    /// Format: `ws://{addr}{prefix}{group_id}`
    #[must_use]
    pub fn ws_url(&self, group_id: &str) -> String {
        format!("ws://{}{}{group_id}", self.local_addr, self.path_prefix)
    }

    /// Accepts connections until `token` is canceled.
    ///
    /// Returns once the listener has stopped and every connection task has
    /// finished. Each connection runs under a child of `token`.
    ///
    /// # Errors
    ///
    /// Accept and per-connection failures are logged, not returned.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let tasks = TaskTracker::new();

        info!(addr = %self.local_addr, "Accept loop started");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Accept loop shutting down");
                    break;
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let session = Session {
                            hub: self.hub.clone(),
                            path_prefix: self.path_prefix.clone(),
                            token: token.child_token(),
                            tasks: tasks.clone(),
                        };

                        tasks.spawn(async move {
                            if let Err(e) = session.handle(stream, addr).await {
                                warn!(error = %e, %addr, "Connection handling failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                },
            }
        }

        tasks.close();
        tasks.wait().await;

        info!("Accept loop terminated");
        Ok(())
    }
}

// ============================================================================
// Session
// ============================================================================

/// Per-connection context.
struct Session {
    hub: Hub,
    path_prefix: String,
    token: CancellationToken,
    /// Server-wide tracker; relayed deliveries run here so `run` joins them.
    tasks: TaskTracker,
}

impl Session {
    /// Upgrades, admits and relays one connection until it ends.
    async fn handle(self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(%addr, "New TCP connection");

        let mut requested_group = None;
        let prefix = self.path_prefix.as_str();
        let callback = |request: &Request, response: Response| {
            let path = request.uri().path();
            match group_from_path(path, prefix) {
                Some(group_id) => {
                    requested_group = Some(group_id);
                    Ok(response)
                }
                None => Err(not_found(path)),
            }
        };

        let ws_stream = tokio::select! {
            _ = self.token.cancelled() => return Ok(()),
            upgraded = tokio_tungstenite::accept_hdr_async(stream, callback) => upgraded?,
        };

        let group_id = requested_group
            .ok_or_else(|| Error::invalid_argument("handshake did not name a group"))?;

        let client = self.hub.admit(WsConnection::new(ws_stream), group_id.clone(), "")?;
        let connection_id = client.connection_id().clone();

        info!(group_id = %group_id, connection_id = %connection_id, %addr, "WebSocket client joined");

        self.hub
            .unicast(
                group_id.as_str(),
                connection_id.as_str(),
                format!("connection_id: {connection_id}"),
            )
            .await?;

        self.relay(&client).await
    }

    /// Rebroadcasts a member's inbound messages until its loop ends.
    ///
    /// Deliveries and disconnects run as separate tasks, so a member that
    /// stopped reading delays only the writes addressed to it.
    async fn relay(&self, client: &Client) -> Result<()> {
        let group_id = client.group_id().clone();
        let connection_id = client.connection_id().clone();

        let (mut events, done) = client.start_receiving(self.token.child_token())?;

        while let Some(event) = events.next().await {
            match event {
                ClientEvent::Message(payload) => {
                    debug!(
                        group_id = %group_id,
                        connection_id = %connection_id,
                        len = payload.len(),
                        "Relaying message"
                    );
                    let hub = self.hub.clone();
                    let group_id = group_id.clone();
                    self.tasks.spawn(async move {
                        let delivery = hub.broadcast(group_id.as_str(), payload).await;
                        if !delivery.is_complete() {
                            debug!(group_id = %group_id, failed = delivery.failed.len(), "Relay partially failed");
                        }
                    });
                }
                ClientEvent::Error(e) => {
                    warn!(group_id = %group_id, connection_id = %connection_id, error = %e, "Receive error");
                }
                ClientEvent::Lost(reason) => {
                    info!(group_id = %group_id, connection_id = %connection_id, ?reason, "Connection lost");
                    let hub = self.hub.clone();
                    let (group_id, connection_id) = (group_id.clone(), connection_id.clone());
                    self.tasks.spawn(async move {
                        hub.disconnect(group_id.as_str(), connection_id.as_str()).await;
                    });
                }
            }
        }

        done.wait().await;

        // Canceled loops report no loss; drop the member here as well.
        self.hub
            .disconnect(group_id.as_str(), connection_id.as_str())
            .await;

        debug!(group_id = %group_id, connection_id = %connection_id, "Client stopped reading");
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Extracts the group name from a request path.
///
/// The path must be `{prefix}{group}` with an optional trailing `/`, and the
/// group must be a single non-empty segment.
fn group_from_path(path: &str, prefix: &str) -> Option<GroupId> {
    let group = path.strip_prefix(prefix)?.trim_end_matches('/');

    if group.is_empty() || group.contains('/') {
        return None;
    }

    Some(GroupId::from(group))
}

/// Builds the handshake rejection for paths without a group.
fn not_found(path: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(format!("no group at {path}")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

// ============================================================================
// Tests
// ============================================================================
