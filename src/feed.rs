//! WebSocket stats feed: push-only live snapshots for external observers.
//!
//! Each client gets the current snapshot on connect, then every snapshot
//! the broadcaster publishes. Clients connect and disconnect freely; a dead
//! or slow client only affects its own forwarding task, never the publish
//! loop or other subscribers.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::models::errors::{EngineError, EngineResult};
use crate::stats::{RunStats, StatsBroadcaster, StatsCollector};

/// WebSocket server fanning out stats snapshots.
pub struct StatsFeed {
    listener: TcpListener,
    addr: SocketAddr,
    collector: Arc<StatsCollector>,
    tx: broadcast::Sender<RunStats>,
}

impl StatsFeed {
    /// Bind the feed listener. Pass port 0 for an ephemeral port.
    pub async fn bind(
        addr: SocketAddr,
        collector: Arc<StatsCollector>,
        broadcaster: &StatsBroadcaster,
    ) -> EngineResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| EngineError::feed_bind_failed(format!("Bind {} failed: {}", addr, e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| EngineError::feed_bind_failed(format!("Local addr failed: {}", e)))?;

        Ok(Self {
            listener,
            addr,
            collector,
            tx: broadcaster.sender(),
        })
    }

    /// Bound address, useful when binding port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Spawn the accept loop.
    pub fn start(self) -> FeedHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let addr = self.addr;
        info!("📊 Stats feed listening on ws://{}", addr);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = self.listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                debug!("Client connected to stats feed: {}", peer);
                                let collector = self.collector.clone();
                                let rx = self.tx.subscribe();
                                tokio::spawn(async move {
                                    if let Err(e) = serve_client(stream, collector, rx).await {
                                        debug!("Stats feed client {} dropped: {}", peer, e);
                                    }
                                });
                            }
                            Err(e) => warn!("⚠️ Stats feed accept failed: {}", e),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Stats feed shutting down");
                        break;
                    }
                }
            }
        });

        FeedHandle {
            addr,
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running feed; `stop` tears the accept loop down
/// deterministically.
pub struct FeedHandle {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// One client: send the current snapshot, then forward published ones.
async fn serve_client(
    stream: TcpStream,
    collector: Arc<StatsCollector>,
    mut rx: broadcast::Receiver<RunStats>,
) -> EngineResult<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| EngineError::feed_bind_failed(format!("Handshake failed: {}", e)))?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    // Initial snapshot on connect
    let initial = serde_json::to_string(&collector.snapshot())?;
    if ws_tx.send(Message::Text(initial)).await.is_err() {
        return Ok(());
    }

    loop {
        tokio::select! {
            published = rx.recv() => {
                match published {
                    Ok(snapshot) => {
                        let payload = serde_json::to_string(&snapshot)?;
                        if ws_tx.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    // Slow client: skip ahead instead of blocking the feed
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Stats feed client lagged, skipped {} snapshots", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    // Pings are answered by tungstenite; ignore the rest
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    Ok(())
}
