//! WebSocket relay server implementation

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use party_core::Config;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, info, warn};

use crate::connection::{run_connection, ConnectionOptions};
use crate::hub::{HubConfig, RelayHub};

/// How long to wait for a complete request line before routing
const REQUEST_LINE_WAIT: Duration = Duration::from_secs(2);

/// Pause between peeks while a request line is still arriving
const PEEK_RETRY: Duration = Duration::from_millis(10);

/// Relay server: accepts sockets and hands them to the hub
pub struct RelayServer {
    hub: Arc<RelayHub>,
    config: Arc<Config>,
}

impl RelayServer {
    /// Create a server with a fresh hub. Starts the reaper, so this must be
    /// called from within a tokio runtime.
    pub fn new(config: Config) -> Self {
        let hub = RelayHub::start(HubConfig::from(&config));
        Self::with_hub(config, hub)
    }

    /// Create a server around an existing hub
    pub fn with_hub(config: Config, hub: Arc<RelayHub>) -> Self {
        Self {
            hub,
            config: Arc::new(config),
        }
    }

    pub fn hub(&self) -> &Arc<RelayHub> {
        &self.hub
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind the configured address and serve until the listener fails
    pub async fn serve(&self) -> Result<(), io::Error> {
        self.serve_on(self.config.server.socket_addr()).await
    }

    /// Bind `addr` and serve
    pub async fn serve_on(&self, addr: SocketAddr) -> Result<(), io::Error> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_listener(&self, listener: TcpListener) -> Result<(), io::Error> {
        info!(
            "Relay server listening on {} (path {})",
            listener.local_addr()?,
            self.config.server.path
        );

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };

            let hub = self.hub.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, hub, config).await {
                    debug!("Connection error from {}: {}", peer_addr, e);
                }
            });
        }
    }
}

/// Handle a single connection (health probe or WebSocket)
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: Arc<RelayHub>,
    config: Arc<Config>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Peek at the request line; only the health path bypasses the upgrade
    let mut peek_buf = [0u8; 64];
    let n = peek_request_line(&stream, &mut peek_buf).await?;
    if request_path(&peek_buf[..n]) == Some("/health") {
        let mut stream = stream;
        return handle_http_request(&mut stream, &hub).await;
    }

    let relay_path = config.server.path.clone();
    let check_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == relay_path {
            return Ok(resp);
        }
        let mut err = ErrorResponse::new(Some("not found".to_string()));
        *err.status_mut() = StatusCode::NOT_FOUND;
        Err(err)
    };

    let ws_config = WebSocketConfig {
        max_message_size: Some(config.limits.max_message_size),
        max_frame_size: Some(config.limits.max_message_size),
        ..Default::default()
    };

    let ws = accept_hdr_async_with_config(stream, check_path, Some(ws_config)).await?;
    run_connection(ws, hub, ConnectionOptions::from(config.as_ref()), peer_addr).await;
    Ok(())
}

/// Handle an HTTP request (for health checks)
async fn handle_http_request(
    stream: &mut TcpStream,
    hub: &RelayHub,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Drain the request; its content is irrelevant
    let mut buf = vec![0u8; 1024];
    let _ = stream.read(&mut buf).await?;

    let body = serde_json::json!({
        "status": "healthy",
        "rooms": hub.room_count(),
        "users": hub.user_count(),
    })
    .to_string();

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Peek until the request line is complete, the buffer is full, the peer
/// stops sending, or [`REQUEST_LINE_WAIT`] runs out. Returns the bytes seen.
async fn peek_request_line(stream: &TcpStream, buf: &mut [u8]) -> io::Result<usize> {
    let deadline = Instant::now() + REQUEST_LINE_WAIT;
    loop {
        let n = stream.peek(buf).await?;
        if n == 0 || n == buf.len() || buf[..n].contains(&b'\n') || Instant::now() >= deadline {
            return Ok(n);
        }
        // peek returns immediately while data is buffered
        tokio::time::sleep(PEEK_RETRY).await;
    }
}

/// Path of a `GET` request line, without any query string
fn request_path(head: &[u8]) -> Option<&str> {
    let head = std::str::from_utf8(head).ok()?;
    let target = head.strip_prefix("GET ")?.split([' ', '\r', '\n']).next()?;
    target.split('?').next()
}
