//! Live subordinate connections on the primary

use futures::SinkExt;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedWrite, LinesCodec};
use tracing::{info, warn};

pub(crate) type LineWriter = FramedWrite<OwnedWriteHalf, LinesCodec>;

struct Connection {
    peer: SocketAddr,
    writer: LineWriter,
}

/// Writer halves keyed by connection id
///
/// Membership changes only on connect, disconnect, or a failed send.
#[derive(Default)]
pub(crate) struct SubordinateRegistry {
    next_id: AtomicU64,
    connections: Mutex<HashMap<u64, Connection>>,
}

impl SubordinateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, peer: SocketAddr, writer: LineWriter) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.lock().await;
        connections.insert(id, Connection { peer, writer });
        info!(
            "Subordinate {} connected (id {}, {} total)",
            peer,
            id,
            connections.len()
        );
        id
    }

    pub async fn remove(&self, id: u64) -> bool {
        let mut connections = self.connections.lock().await;
        match connections.remove(&id) {
            Some(conn) => {
                info!(
                    "Subordinate {} disconnected (id {}, {} remaining)",
                    conn.peer,
                    id,
                    connections.len()
                );
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// Drop every connection, closing the writer halves
    pub async fn clear(&self) {
        self.connections.lock().await.clear();
    }

    /// Send `line` to one connection; a failure removes it
    pub async fn send_to(&self, id: u64, line: &str, timeout: Duration) -> bool {
        let mut connections = self.connections.lock().await;
        let Some(conn) = connections.get_mut(&id) else {
            return false;
        };
        match tokio::time::timeout(timeout, conn.writer.send(line)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Send to subordinate {} failed: {}", conn.peer, e);
                connections.remove(&id);
                false
            }
            Err(_) => {
                warn!("Send to subordinate {} timed out", conn.peer);
                connections.remove(&id);
                false
            }
        }
    }

    /// Send `line` to every connection concurrently
    ///
    /// Connections whose send fails or times out are pruned before this
    /// returns. Returns the number of successful deliveries.
    pub async fn send_all(&self, line: &str, timeout: Duration) -> usize {
        let mut connections = self.connections.lock().await;
        if connections.is_empty() {
            return 0;
        }

        let results = futures::future::join_all(connections.iter_mut().map(|(id, conn)| {
            let id = *id;
            async move {
                let outcome = match tokio::time::timeout(timeout, conn.writer.send(line)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err("timed out".to_string()),
                };
                (id, conn.peer, outcome)
            }
        }))
        .await;

        let mut delivered = 0;
        for (id, peer, outcome) in results {
            match outcome {
                Ok(()) => delivered += 1,
                Err(reason) => {
                    warn!("Dropping subordinate {} (id {}): {}", peer, id, reason);
                    connections.remove(&id);
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_util::codec::FramedRead;

    async fn connected_pair() -> (LineWriter, SocketAddr, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        let (_read, write) = server.into_split();
        (FramedWrite::new(write, LinesCodec::new()), peer, client)
    }

    #[tokio::test]
    async fn test_send_all_delivers_lines() {
        let registry = SubordinateRegistry::new();
        let (writer, peer, client) = connected_pair().await;
        registry.insert(peer, writer).await;

        let delivered = registry
            .send_all(r#"{"type":"heartbeat"}"#, Duration::from_secs(1))
            .await;
        assert_eq!(delivered, 1);

        let mut lines = FramedRead::new(client, LinesCodec::new());
        let line = lines.next().await.unwrap().unwrap();
        assert_eq!(line, r#"{"type":"heartbeat"}"#);
    }

    #[tokio::test]
    async fn test_empty_registry_sends_nothing() {
        let registry = SubordinateRegistry::new();
        assert_eq!(registry.send_all("x", Duration::from_secs(1)).await, 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_insert_remove() {
        let registry = SubordinateRegistry::new();
        let (writer_a, peer_a, _client_a) = connected_pair().await;
        let (writer_b, peer_b, _client_b) = connected_pair().await;

        let a = registry.insert(peer_a, writer_a).await;
        let b = registry.insert(peer_b, writer_b).await;
        assert_ne!(a, b);
        assert_eq!(registry.len().await, 2);

        assert!(registry.remove(a).await);
        assert!(!registry.remove(a).await);
        assert_eq!(registry.len().await, 1);

        registry.clear().await;
        assert!(registry.is_empty().await);
    }
}
