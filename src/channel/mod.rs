//! Peer-channel contract used by the direct controllers.
//!
//! A [`PeerProvider`] owns an identity (the session host id a receiver dials)
//! and hands out [`PeerLink`]s, either by dialing another provider or by
//! accepting an inbound connection. Providers are explicit resources: build
//! one, pass it as `Arc<dyn PeerProvider>` to the controller that needs it,
//! drop it when the page/session is over.
//!
//! Two providers ship with the crate:
//! - [`memory::MemoryHub`]: in-process links, for tests and embedding.
//! - [`tcp::TcpPeer`]: length-prefixed frames over TCP.

pub mod memory;
pub mod tcp;

use std::{future::Future, pin::Pin, time::Duration};

use tokio::sync::mpsc;

use crate::{message::TransferMessage, BeamError, Result};

/// How many frames may sit in a link buffer before `send` suspends.
pub const DEFAULT_LINK_CAPACITY: usize = 32;

/// How long `close` waits for the other end to let go of the link.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

pub type LinkFuture<'a> =
    Pin<Box<dyn Future<Output = Result<PeerLink>> + Send + 'a>>;

pub trait PeerProvider: Send + Sync {
    /// The id a remote peer passes to [`PeerProvider::connect`].
    fn local_id(&self) -> String;

    /// Opens a link to another provider.
    fn connect<'a>(&'a self, remote_id: &'a str) -> LinkFuture<'a>;

    /// Waits for the next inbound link.
    fn accept(&self) -> LinkFuture<'_>;
}

/// What travels through a link buffer.
#[derive(Debug)]
pub enum LinkEvent {
    Frame(Vec<u8>),
    /// Orderly end of the stream.
    Closed,
    /// The transport broke.
    Failed(String),
}

/// One ordered, duplex connection between two peers.
///
/// Delivery order matches send order. `send` suspends while the buffer is
/// full, so a slow reader slows the writer down.
#[derive(Debug)]
pub struct PeerLink {
    remote_id: String,
    outbound: mpsc::Sender<LinkEvent>,
    inbound: mpsc::Receiver<LinkEvent>,
}

impl PeerLink {
    pub fn new(
        remote_id: impl Into<String>,
        outbound: mpsc::Sender<LinkEvent>,
        inbound: mpsc::Receiver<LinkEvent>,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            outbound,
            inbound,
        }
    }

    /// Two links wired to each other: what one sends, the other receives.
    pub fn pair(
        a_id: impl Into<String>,
        b_id: impl Into<String>,
        capacity: usize,
    ) -> (PeerLink, PeerLink) {
        let (a_tx, b_rx) = mpsc::channel(capacity.max(1));
        let (b_tx, a_rx) = mpsc::channel(capacity.max(1));
        // each side is named after the peer it talks to
        (
            PeerLink::new(b_id, a_tx, a_rx),
            PeerLink::new(a_id, b_tx, b_rx),
        )
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub async fn send(&self, message: &TransferMessage) -> Result<()> {
        let frame = message.to_frame()?;
        log::trace!(
            "-> {} {} ({} bytes)",
            self.remote_id,
            message.kind(),
            frame.len()
        );
        self.outbound
            .send(LinkEvent::Frame(frame))
            .await
            .map_err(|_| {
                BeamError::LinkLost(format!(
                    "{} is no longer reading",
                    self.remote_id
                ))
            })
    }

    /// Next message, `Ok(None)` once the peer closed the link.
    pub async fn recv(&mut self) -> Result<Option<TransferMessage>> {
        match self.inbound.recv().await {
            Some(LinkEvent::Frame(frame)) => {
                let message = TransferMessage::from_frame(&frame)?;
                log::trace!("<- {} {}", self.remote_id, message.kind());
                Ok(Some(message))
            }
            Some(LinkEvent::Closed) | None => Ok(None),
            Some(LinkEvent::Failed(reason)) => Err(BeamError::LinkLost(reason)),
        }
    }

    /// Ends the stream after everything already sent, then waits (briefly)
    /// for the other end to release it.
    pub async fn close(self) {
        let PeerLink {
            remote_id,
            outbound,
            inbound,
        } = self;
        drop(inbound);
        if outbound.send(LinkEvent::Closed).await.is_err() {
            return;
        }
        if tokio::time::timeout(CLOSE_GRACE, outbound.closed())
            .await
            .is_err()
        {
            log::debug!("{} did not release the link in time", remote_id);
        }
    }

    /// Tears the link down, reporting `reason` to the other end.
    pub async fn fail(self, reason: impl Into<String>) {
        let PeerLink {
            outbound, inbound, ..
        } = self;
        drop(inbound);
        let _ = outbound
            .send(LinkEvent::Failed(reason.into()))
            .await;
    }
}
