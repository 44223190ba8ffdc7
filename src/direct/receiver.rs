use std::sync::Arc;

use log::{debug, info, warn};
use tokio::{sync::watch, task::JoinHandle};

use super::StateCell;
use crate::{
    batch::BatchSession,
    channel::{PeerLink, PeerProvider},
    file::ReceivedFile,
    payload::{DirectPayload, SignalingPayload},
    subscribers::{Subscriber, Subscribers},
    BeamError, Result,
};

/// `Idle -> Connecting -> Receiving -> Complete`, with `Failed` reachable
/// from `Connecting` and `Receiving`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceiveState {
    Idle,
    Connecting,
    Receiving {
        arrived: usize,
        expected: Option<usize>,
    },
    Complete {
        count: usize,
    },
    Failed(BeamError),
}

impl ReceiveState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReceiveState::Complete { .. } | ReceiveState::Failed(_))
    }
}

pub trait DirectReceiveSubscriber: Subscriber {
    fn notify_state(&self, state: &ReceiveState);
    /// Called when both halves of a file have been seen.
    fn notify_arrived(&self, event: DirectArrivedEvent);
    fn notify_complete(&self, files: &[ReceivedFile]);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectArrivedEvent {
    pub sequence_index: usize,
    pub name: String,
    pub arrived: usize,
    pub expected: Option<usize>,
}

/// Receiving half of a direct share.
///
/// Files only leave the receiver as a complete batch. If the link breaks
/// first, everything received so far is dropped along with the session.
pub struct DirectReceiver {
    provider: Arc<dyn PeerProvider>,
    state: StateCell<ReceiveState>,
    subscribers: Subscribers<dyn DirectReceiveSubscriber>,
    task: Option<JoinHandle<Result<Vec<ReceivedFile>>>>,
}

impl DirectReceiver {
    pub fn new(provider: Arc<dyn PeerProvider>) -> Self {
        Self {
            provider,
            state: StateCell::new(ReceiveState::Idle),
            subscribers: Subscribers::default(),
            task: None,
        }
    }

    pub fn state(&self) -> ReceiveState {
        self.state.current()
    }

    pub fn watch_state(&self) -> watch::Receiver<ReceiveState> {
        self.state.watch()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn DirectReceiveSubscriber>) {
        self.subscribers.subscribe(subscriber);
    }

    pub fn unsubscribe(&self, subscriber: &Arc<dyn DirectReceiveSubscriber>) {
        self.subscribers.unsubscribe(subscriber);
    }

    /// Dials the host named by a decoded direct payload.
    pub fn accept_payload(&mut self, payload: SignalingPayload) -> Result<()> {
        let payload = match payload {
            SignalingPayload::Direct(payload) => payload,
            SignalingPayload::Relay(_) => {
                return Err(BeamError::InvalidState(
                    "relay payloads are not received over a direct link"
                        .to_string(),
                ))
            }
        };
        if self.state() != ReceiveState::Idle {
            return Err(BeamError::InvalidState(format!(
                "cannot accept a payload in {:?}",
                self.state()
            )));
        }

        let session = Session {
            provider: self.provider.clone(),
            state: self.state.clone(),
            generation: self.state.generation(),
            subscribers: self.subscribers.clone(),
        };
        session.publish(ReceiveState::Connecting);
        info!(
            "receiving {} file(s) from {}",
            payload.files.len(),
            payload.session_host_id
        );
        self.task = Some(tokio::spawn(session.run(payload)));
        Ok(())
    }

    /// Waits for the batch. Files come back ordered by `sequence_index`.
    pub async fn wait(&mut self) -> Result<Vec<ReceivedFile>> {
        let task = self.task.take().ok_or_else(|| {
            BeamError::InvalidState("no session is running".to_string())
        })?;
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(BeamError::InvalidState(
                "session was reset".to_string(),
            )),
            Err(e) => Err(BeamError::InvalidState(format!(
                "session task crashed: {}",
                e
            ))),
        }
    }

    /// Forgets the current session and detaches its link.
    pub fn scan_again(&mut self) {
        self.state.reset(ReceiveState::Idle);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.subscribers
            .notify(|s| s.notify_state(&ReceiveState::Idle));
        debug!("receiver reset, ready to scan");
    }
}

impl Drop for DirectReceiver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Session {
    provider: Arc<dyn PeerProvider>,
    state: StateCell<ReceiveState>,
    generation: u64,
    subscribers: Subscribers<dyn DirectReceiveSubscriber>,
}

impl Session {
    fn publish(&self, state: ReceiveState) -> bool {
        let stored = self.state.publish(self.generation, state.clone());
        if stored {
            self.subscribers
                .notify(|s| s.notify_state(&state));
        }
        stored
    }

    async fn run(self, payload: DirectPayload) -> Result<Vec<ReceivedFile>> {
        let mut link =
            match self.provider.connect(&payload.session_host_id).await {
                Ok(link) => link,
                Err(e) => {
                    warn!(
                        "could not reach {}: {}",
                        payload.session_host_id, e
                    );
                    let e = match e {
                        BeamError::LinkLost(_) => e,
                        other => BeamError::LinkLost(other.to_string()),
                    };
                    self.publish(ReceiveState::Failed(e.clone()));
                    return Err(e);
                }
            };
        self.publish(ReceiveState::Receiving {
            arrived: 0,
            expected: None,
        });

        match self.receive(&mut link).await {
            Ok(files) => {
                info!(
                    "received {} file(s) from {}",
                    files.len(),
                    link.remote_id()
                );
                if self.publish(ReceiveState::Complete { count: files.len() })
                {
                    self.subscribers
                        .notify(|s| s.notify_complete(&files));
                }
                drop(link);
                Ok(files)
            }
            Err(e) => {
                warn!("receiving from {} failed: {}", link.remote_id(), e);
                self.publish(ReceiveState::Failed(e.clone()));
                link.fail(e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn receive(&self, link: &mut PeerLink) -> Result<Vec<ReceivedFile>> {
        let mut session = BatchSession::new();
        while !session.is_complete() {
            let message = link.recv().await?.ok_or_else(|| {
                BeamError::LinkLost(format!(
                    "{} closed the link after {} of {:?} files",
                    link.remote_id(),
                    session.arrived_count(),
                    session.expected_count()
                ))
            })?;
            debug!("{} from {}", message.kind(), link.remote_id());

            let started = session.expected_count().is_none();
            let arrived = session.apply(message)?;
            let expected = session.expected_count();

            if let Some(index) = arrived {
                let name = session
                    .record(index)
                    .map(|r| r.name.clone())
                    .unwrap_or_default();
                let event = DirectArrivedEvent {
                    sequence_index: index,
                    name,
                    arrived: session.arrived_count(),
                    expected,
                };
                self.subscribers
                    .notify(|s| s.notify_arrived(event.clone()));
            }
            if arrived.is_some() || (started && expected.is_some()) {
                self.publish(ReceiveState::Receiving {
                    arrived: session.arrived_count(),
                    expected,
                });
            }
        }
        session.into_files()
    }
}
