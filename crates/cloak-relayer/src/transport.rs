//! Transport abstraction between decryption clients and the service.
//!
//! Implementations may use HTTP, WebSockets or anything else; the in-memory
//! network below is used by tests and local deployments.

use async_trait::async_trait;

use crate::error::RelayerError;
use crate::messages::{EndpointId, RelayerMessage};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, RelayerError>;

/// Message delivery between endpoints. Implementations must be `Send + Sync`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message to a specific endpoint.
    async fn send(&self, peer: &EndpointId, message: RelayerMessage) -> Result<()>;

    /// Receive the next message from any endpoint.
    async fn recv(&self) -> Result<(EndpointId, RelayerMessage)>;

    /// Receive with timeout. `None` if nothing arrived in time.
    async fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<Option<(EndpointId, RelayerMessage)>>;

    fn local_id(&self) -> EndpointId;

    async fn is_connected(&self, peer: &EndpointId) -> bool;
}

/// Channel-backed in-memory transport.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex, RwLock};

    #[derive(Debug)]
    struct Envelope {
        from: EndpointId,
        message: RelayerMessage,
    }

    /// Shared routing table of the in-memory network.
    #[derive(Default)]
    pub struct MemoryNetwork {
        senders: RwLock<HashMap<EndpointId, mpsc::Sender<Envelope>>>,
    }

    impl MemoryNetwork {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Attach an endpoint to the network.
        pub async fn create_transport(self: &Arc<Self>, id: EndpointId) -> MemoryTransport {
            let (tx, rx) = mpsc::channel(1000);
            self.senders.write().await.insert(id, tx);
            MemoryTransport {
                id,
                network: Arc::clone(self),
                receiver: Mutex::new(rx),
            }
        }

        /// Detach an endpoint; later sends to it fail.
        pub async fn disconnect(&self, id: &EndpointId) {
            self.senders.write().await.remove(id);
        }
    }

    /// One endpoint on a [`MemoryNetwork`].
    pub struct MemoryTransport {
        id: EndpointId,
        network: Arc<MemoryNetwork>,
        receiver: Mutex<mpsc::Receiver<Envelope>>,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&self, peer: &EndpointId, message: RelayerMessage) -> Result<()> {
            let sender = self
                .network
                .senders
                .read()
                .await
                .get(peer)
                .cloned()
                .ok_or_else(|| RelayerError::Transport("peer not found".into()))?;
            sender
                .send(Envelope {
                    from: self.id,
                    message,
                })
                .await
                .map_err(|_| RelayerError::Transport("peer disconnected".into()))
        }

        async fn recv(&self) -> Result<(EndpointId, RelayerMessage)> {
            let mut rx = self.receiver.lock().await;
            match rx.recv().await {
                Some(envelope) => Ok((envelope.from, envelope.message)),
                None => Err(RelayerError::Transport("channel closed".into())),
            }
        }

        async fn recv_timeout(
            &self,
            timeout: std::time::Duration,
        ) -> Result<Option<(EndpointId, RelayerMessage)>> {
            let mut rx = self.receiver.lock().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(envelope)) => Ok(Some((envelope.from, envelope.message))),
                Ok(None) => Err(RelayerError::Transport("channel closed".into())),
                Err(_) => Ok(None),
            }
        }

        fn local_id(&self) -> EndpointId {
            self.id
        }

        async fn is_connected(&self, peer: &EndpointId) -> bool {
            self.network.senders.read().await.contains_key(peer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryNetwork;
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_send_recv() {
        let network = MemoryNetwork::new();
        let a = EndpointId::from_bytes([0xAA; 32]);
        let b = EndpointId::from_bytes([0xBB; 32]);
        let ta = network.create_transport(a).await;
        let tb = network.create_transport(b).await;

        ta.send(
            &b,
            RelayerMessage::PublicDecrypt {
                request_id: 7,
                handles: vec![],
            },
        )
        .await
        .unwrap();

        let (from, received) = tb.recv().await.unwrap();
        assert_eq!(from, a);
        assert_eq!(received.request_id(), 7);
    }

    #[tokio::test]
    async fn test_send_to_unknown_and_timeout() {
        let network = MemoryNetwork::new();
        let a = EndpointId::from_bytes([0xAA; 32]);
        let b = EndpointId::from_bytes([0xBB; 32]);
        let ta = network.create_transport(a).await;

        let msg = RelayerMessage::PublicDecrypt {
            request_id: 1,
            handles: vec![],
        };
        assert!(ta.send(&b, msg).await.is_err());
        assert!(!ta.is_connected(&b).await);

        let got = ta
            .recv_timeout(std::time::Duration::from_millis(10))
            .await
            .unwrap();
        assert!(got.is_none());
    }
}
