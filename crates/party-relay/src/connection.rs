//! Per-connection lifecycle
//!
//! Each upgraded socket runs three pieces:
//! - a writer task that owns the sink and drains the outbound queue, bounding
//!   every write by the write timeout;
//! - a ping task that queues a ping every ping interval;
//! - the read loop (this task), which feeds frames to the hub and closes the
//!   connection when no pong arrives within the pong timeout.
//!
//! However the connection ends, the hub teardown runs exactly once.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use party_core::Config;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, timeout_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use crate::handle::ConnectionHandle;
use crate::hub::RelayHub;
use crate::OUTBOUND_QUEUE_CAPACITY;

/// Connection timing and buffering
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Bound on a single outbound write
    pub write_wait: Duration,
    /// Silence allowed since the last pong
    pub pong_wait: Duration,
    /// Interval between liveness probes
    pub ping_interval: Duration,
    /// Outbound queue depth before deliveries are dropped
    pub outbound_capacity: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ConnectionOptions {
    fn from(config: &Config) -> Self {
        Self {
            write_wait: config.timeouts.write_wait(),
            pong_wait: config.timeouts.pong_wait(),
            ping_interval: config.timeouts.ping_interval(),
            outbound_capacity: OUTBOUND_QUEUE_CAPACITY,
        }
    }
}

/// Drive one upgraded WebSocket until it closes
pub async fn run_connection<S>(
    ws: WebSocketStream<S>,
    hub: Arc<RelayHub>,
    opts: ConnectionOptions,
    peer_addr: SocketAddr,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, mut stream) = ws.split();
    let (conn, rx) = ConnectionHandle::channel(opts.outbound_capacity);
    let conn_id = conn.id();
    debug!("Connection {} opened from {}", conn_id, peer_addr);

    let mut writer = tokio::spawn(write_loop(sink, rx, opts.write_wait));
    let pinger = tokio::spawn(ping_loop(conn.clone(), opts.ping_interval));

    let mut session = hub.open_session(conn);
    let mut deadline = Instant::now() + opts.pong_wait;
    let mut writer_done = false;

    loop {
        tokio::select! {
            next = timeout_at(deadline, stream.next()) => {
                let msg = match next {
                    Err(_) => {
                        debug!("Connection {}: no pong within {:?}", conn_id, opts.pong_wait);
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        debug!("Connection {}: read error: {}", conn_id, e);
                        break;
                    }
                    Ok(Some(Ok(msg))) => msg,
                };

                match msg {
                    Message::Text(text) => hub.handle_frame(&mut session, text.as_bytes()),
                    Message::Binary(data) => hub.handle_frame(&mut session, &data),
                    Message::Pong(_) => deadline = Instant::now() + opts.pong_wait,
                    Message::Close(_) => break,
                    // Pings are answered by the protocol layer
                    Message::Ping(_) | Message::Frame(_) => {}
                }
            }
            _ = &mut writer => {
                debug!("Connection {}: writer stopped", conn_id);
                writer_done = true;
                break;
            }
        }
    }

    hub.teardown(&mut session);
    pinger.abort();
    let _ = pinger.await;

    // Last handle gone: the writer flushes what is queued, closes, and exits
    drop(session);
    if !writer_done && timeout(opts.write_wait, &mut writer).await.is_err() {
        debug!("Connection {}: writer did not drain in time", conn_id);
        writer.abort();
    }
    debug!("Connection {} closed", conn_id);
}

async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut rx: mpsc::Receiver<Message>,
    write_wait: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(msg) = rx.recv().await {
        match timeout(write_wait, sink.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("Write failed: {}", e);
                return;
            }
            Err(_) => {
                debug!("Write timed out after {:?}", write_wait);
                return;
            }
        }
    }

    // Every handle is gone; close politely
    let _ = timeout(write_wait, sink.close()).await;
}

/// Queue a ping every `ping_interval`. Stops at the first ping that cannot
/// be queued; the pong deadline then closes the connection.
async fn ping_loop(conn: ConnectionHandle, ping_interval: Duration) {
    let mut tick = interval_at(Instant::now() + ping_interval, ping_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;
        if let Err(e) = conn.ping() {
            debug!("Connection {}: ping loop stopped: {}", conn.id(), e);
            break;
        }
    }
}
