//! In-process peer provider.
//!
//! Every [`MemoryPeer`] registers itself with a shared [`MemoryHub`] under a
//! random id; dialing that id from another peer of the same hub produces a
//! pair of cross-wired [`PeerLink`]s.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use uuid::Uuid;

use super::{LinkFuture, PeerLink, PeerProvider, DEFAULT_LINK_CAPACITY};
use crate::BeamError;

#[derive(Clone)]
pub struct MemoryHub {
    peers: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<PeerLink>>>>,
    capacity: usize,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LINK_CAPACITY)
    }
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A hub whose links buffer at most `capacity` frames per direction.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            peers: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn peer(&self) -> MemoryPeer {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), tx);
        MemoryPeer {
            id,
            hub: self.clone(),
            incoming: AsyncMutex::new(rx),
        }
    }

    fn deliver(&self, to: &str, link: PeerLink) -> bool {
        let peers = self
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match peers.get(to) {
            Some(tx) => tx.send(link).is_ok(),
            None => false,
        }
    }
}

pub struct MemoryPeer {
    id: String,
    hub: MemoryHub,
    incoming: AsyncMutex<mpsc::UnboundedReceiver<PeerLink>>,
}

impl PeerProvider for MemoryPeer {
    fn local_id(&self) -> String {
        self.id.clone()
    }

    fn connect<'a>(&'a self, remote_id: &'a str) -> LinkFuture<'a> {
        Box::pin(async move {
            let (local, remote) =
                PeerLink::pair(self.id.clone(), remote_id, self.hub.capacity);
            if !self.hub.deliver(remote_id, remote) {
                return Err(BeamError::LinkLost(format!(
                    "no peer listening as {}",
                    remote_id
                )));
            }
            log::debug!("{} connected to {}", self.id, remote_id);
            Ok(local)
        })
    }

    fn accept(&self) -> LinkFuture<'_> {
        Box::pin(async move {
            let mut incoming = self.incoming.lock().await;
            incoming.recv().await.ok_or_else(|| {
                BeamError::LinkLost(format!("{} stopped listening", self.id))
            })
        })
    }
}

impl Drop for MemoryPeer {
    fn drop(&mut self) {
        self.hub
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::TransferMessage;

    #[tokio::test]
    async fn peers_of_one_hub_can_dial_each_other() {
        let hub = MemoryHub::new();
        let host = hub.peer();
        let guest = hub.peer();
        assert_ne!(host.local_id(), guest.local_id());

        let host_id = host.local_id();
        let outbound = guest.connect(&host_id).await.unwrap();
        let mut inbound = host.accept().await.unwrap();
        assert_eq!(inbound.remote_id(), guest.local_id());

        outbound
            .send(&TransferMessage::BatchStart { count: 3 })
            .await
            .unwrap();
        assert_eq!(
            inbound.recv().await.unwrap(),
            Some(TransferMessage::BatchStart { count: 3 })
        );
    }

    #[tokio::test]
    async fn dialing_an_unknown_or_dropped_peer_fails() {
        let hub = MemoryHub::new();
        let guest = hub.peer();
        assert!(matches!(
            guest.connect("nobody").await,
            Err(BeamError::LinkLost(_))
        ));

        let host = hub.peer();
        let host_id = host.local_id();
        drop(host);
        assert!(guest.connect(&host_id).await.is_err());
    }
}
