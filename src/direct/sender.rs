use std::{convert::Infallible, sync::Arc};

use log::{debug, info, warn};
use tokio::{sync::watch, task::JoinHandle};

use super::StateCell;
use crate::{
    channel::{PeerLink, PeerProvider},
    file::{Batch, OutgoingFile},
    message::TransferMessage,
    payload::SignalingPayload,
    subscribers::{Subscriber, Subscribers},
    BeamError, Result,
};

/// `Idle -> AwaitingPeer -> Streaming -> Done`, with `Failed` reachable
/// from `AwaitingPeer` and `Streaming`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendState {
    Idle,
    AwaitingPeer,
    Streaming { sent: usize, total: usize },
    Done,
    Failed(BeamError),
}

impl SendState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SendState::Done | SendState::Failed(_))
    }
}

pub trait DirectSendSubscriber: Subscriber {
    fn notify_state(&self, state: &SendState);
    /// Called after each FILE message has been handed to the channel.
    fn notify_sent(&self, event: DirectSentEvent);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectSentEvent {
    pub sequence_index: usize,
    pub name: String,
    pub files_sent: usize,
    pub total: usize,
}

/// Sending half of a direct share.
///
/// One inbound connection is served per share. Peers that dial in while a
/// batch is streaming are turned away; after `Done` or `Failed` the sender
/// has to be terminated and shared again, which yields a fresh payload
/// under the same host id.
pub struct DirectSender {
    provider: Arc<dyn PeerProvider>,
    batch: Batch,
    state: StateCell<SendState>,
    subscribers: Subscribers<dyn DirectSendSubscriber>,
    task: Option<JoinHandle<()>>,
}

impl DirectSender {
    pub fn new(provider: Arc<dyn PeerProvider>, batch: Batch) -> Self {
        Self {
            provider,
            batch,
            state: StateCell::new(SendState::Idle),
            subscribers: Subscribers::default(),
            task: None,
        }
    }

    pub fn state(&self) -> SendState {
        self.state.current()
    }

    pub fn watch_state(&self) -> watch::Receiver<SendState> {
        self.state.watch()
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub fn subscribe(&self, subscriber: Arc<dyn DirectSendSubscriber>) {
        self.subscribers.subscribe(subscriber);
    }

    pub fn unsubscribe(&self, subscriber: &Arc<dyn DirectSendSubscriber>) {
        self.subscribers.unsubscribe(subscriber);
    }

    /// Builds the direct payload and starts waiting for the receiver.
    pub fn share(&mut self) -> Result<SignalingPayload> {
        if self.state() != SendState::Idle {
            return Err(BeamError::InvalidState(format!(
                "cannot share from {:?}",
                self.state()
            )));
        }
        if self.batch.is_empty() {
            return Err(BeamError::InvalidState(
                "nothing selected to share".to_string(),
            ));
        }

        let host_id = self.provider.local_id();
        let payload = SignalingPayload::direct(&host_id, self.batch.records())?;

        let session = Session {
            provider: self.provider.clone(),
            files: self.batch.files().to_vec(),
            state: self.state.clone(),
            generation: self.state.generation(),
            subscribers: self.subscribers.clone(),
        };
        session.publish(SendState::AwaitingPeer);
        info!(
            "sharing {} file(s) directly as {}",
            self.batch.len(),
            host_id
        );
        self.task = Some(tokio::spawn(session.serve()));
        Ok(payload)
    }

    /// Waits for the current share to finish.
    pub async fn wait(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    return Err(BeamError::InvalidState(format!(
                        "session task crashed: {}",
                        e
                    )));
                }
            }
        }
        match self.state() {
            SendState::Done => Ok(()),
            SendState::Failed(e) => Err(e),
            other => Err(BeamError::InvalidState(format!(
                "session ended in {:?}",
                other
            ))),
        }
    }

    /// Drops the current session, whatever it is doing, and returns to
    /// `Idle`. The channel to the receiver, if any, is released.
    pub fn terminate(&mut self) {
        self.state.reset(SendState::Idle);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.subscribers
            .notify(|s| s.notify_state(&SendState::Idle));
        debug!("direct share terminated");
    }
}

impl Drop for DirectSender {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Session {
    provider: Arc<dyn PeerProvider>,
    files: Vec<OutgoingFile>,
    state: StateCell<SendState>,
    generation: u64,
    subscribers: Subscribers<dyn DirectSendSubscriber>,
}

impl Session {
    fn publish(&self, state: SendState) {
        if self.state.publish(self.generation, state.clone()) {
            self.subscribers
                .notify(|s| s.notify_state(&state));
        }
    }

    async fn serve(self) {
        let link = match self.provider.accept().await {
            Ok(link) => link,
            Err(e) => {
                warn!("waiting for a peer failed: {}", e);
                self.publish(SendState::Failed(e));
                return;
            }
        };
        info!("peer {} connected, streaming batch", link.remote_id());
        self.publish(SendState::Streaming {
            sent: 0,
            total: self.files.len(),
        });

        // extra peers are refused for exactly as long as this future lives
        let result = tokio::select! {
            result = self.stream(&link) => result,
            never = turn_away_peers(self.provider.as_ref()) => match never {},
        };

        match result {
            Ok(()) => {
                info!("batch sent to {}", link.remote_id());
                self.publish(SendState::Done);
                link.close().await;
            }
            Err(e) => {
                warn!("streaming to {} failed: {}", link.remote_id(), e);
                self.publish(SendState::Failed(e.clone()));
                link.fail(e.to_string()).await;
            }
        }
    }

    async fn stream(&self, link: &PeerLink) -> Result<()> {
        let total = self.files.len();
        link.send(&TransferMessage::BatchStart { count: total })
            .await?;

        for (sent, file) in self.files.iter().enumerate() {
            let record = &file.record;
            let bytes = file.source.read_all().await?;
            debug!(
                "sending file #{} {} ({} bytes)",
                record.sequence_index,
                record.name,
                bytes.len()
            );
            link.send(&TransferMessage::meta(record)).await?;
            link.send(&TransferMessage::File {
                sequence_index: record.sequence_index,
                bytes,
            })
            .await?;

            let files_sent = sent + 1;
            self.publish(SendState::Streaming {
                sent: files_sent,
                total,
            });
            self.subscribers.notify(|s| {
                s.notify_sent(DirectSentEvent {
                    sequence_index: record.sequence_index,
                    name: record.name.clone(),
                    files_sent,
                    total,
                })
            });
        }
        Ok(())
    }
}

/// Refuses every further inbound link while a batch is streaming.
async fn turn_away_peers(provider: &dyn PeerProvider) -> Infallible {
    loop {
        match provider.accept().await {
            Ok(link) => {
                warn!(
                    "turning away {}: session already consumed",
                    link.remote_id()
                );
                link.fail("session already consumed").await;
            }
            Err(e) => {
                debug!("no longer accepting extra peers: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}
