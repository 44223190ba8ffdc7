use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use url::Url;

use super::{ObjectStore, UploadMeta};
use crate::{
    file::Batch,
    payload::SignalingPayload,
    subscribers::{Subscriber, Subscribers},
    BeamError, Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    /// Tries per file before the batch is abandoned. `1` gives up on the
    /// first failed upload.
    pub upload_attempts: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { upload_attempts: 1 }
    }
}

pub trait RelaySendSubscriber: Subscriber {
    fn notify_uploaded(&self, event: RelayUploadedEvent);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayUploadedEvent {
    pub sequence_index: usize,
    pub name: String,
    pub locator: Url,
    pub uploaded: usize,
    pub total: usize,
}

/// Uploads a batch, one file at a time, and builds the relay payload.
///
/// Only one upload is in flight at any moment. Dropping the future
/// returned by [`RelaySender::share`] abandons the batch; an upload that
/// was already running is not awaited and its result is lost.
pub struct RelaySender {
    store: Arc<dyn ObjectStore>,
    config: RelayConfig,
    subscribers: Subscribers<dyn RelaySendSubscriber>,
}

impl RelaySender {
    pub fn new(store: Arc<dyn ObjectStore>, config: RelayConfig) -> Self {
        Self {
            store,
            config,
            subscribers: Subscribers::default(),
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn RelaySendSubscriber>) {
        self.subscribers.subscribe(subscriber);
    }

    pub fn unsubscribe(&self, subscriber: &Arc<dyn RelaySendSubscriber>) {
        self.subscribers.unsubscribe(subscriber);
    }

    /// Uploads every file in index order. Any file that still fails after
    /// the configured attempts fails the whole batch and no payload is
    /// produced.
    pub async fn share(&self, batch: &Batch) -> Result<SignalingPayload> {
        if batch.is_empty() {
            return Err(BeamError::InvalidState(
                "nothing selected to share".to_string(),
            ));
        }
        let total = batch.len();
        let attempts = self.config.upload_attempts.max(1);
        info!("uploading {} file(s) to the relay", total);

        let mut records = Vec::with_capacity(total);
        for (done, file) in batch.files().iter().enumerate() {
            let record = &file.record;
            let meta = UploadMeta::from(record);
            let bytes = file.source.read_all().await.map_err(|e| {
                BeamError::UploadFailed {
                    index: record.sequence_index,
                    reason: e.to_string(),
                }
            })?;

            let locator = self.upload(bytes, &meta, attempts).await?;
            debug!("file #{} stored at {}", record.sequence_index, locator);
            records.push(record.clone().with_locator(locator.clone()));

            let uploaded = done + 1;
            self.subscribers.notify(|s| {
                s.notify_uploaded(RelayUploadedEvent {
                    sequence_index: record.sequence_index,
                    name: record.name.clone(),
                    locator: locator.clone(),
                    uploaded,
                    total,
                })
            });
        }

        let payload = SignalingPayload::relay(records, Utc::now())?;
        info!("all {} file(s) uploaded", total);
        Ok(payload)
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        meta: &UploadMeta,
        attempts: u32,
    ) -> Result<Url> {
        for attempt in 1..attempts {
            match self.store.upload(bytes.clone(), meta).await {
                Ok(receipt) => return Ok(receipt.secure_url),
                Err(e) => warn!(
                    "upload of file #{} failed (attempt {}/{}): {}",
                    meta.sequence_index, attempt, attempts, e
                ),
            }
        }
        match self.store.upload(bytes, meta).await {
            Ok(receipt) => Ok(receipt.secure_url),
            Err(e) => {
                warn!("giving up on file #{}: {}", meta.sequence_index, e);
                Err(BeamError::UploadFailed {
                    index: meta.sequence_index,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{UploadFuture, UploadReceipt};
    use std::sync::Mutex;

    /// Fails the calls whose position (0-based) is listed.
    struct FlakyStore {
        failing_calls: Vec<usize>,
        calls: Mutex<Vec<usize>>,
    }

    impl FlakyStore {
        fn new(failing_calls: Vec<usize>) -> Self {
            Self {
                failing_calls,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ObjectStore for FlakyStore {
        fn upload<'a>(
            &'a self,
            _bytes: Vec<u8>,
            meta: &'a UploadMeta,
        ) -> UploadFuture<'a> {
            Box::pin(async move {
                let position = {
                    let mut calls = self.calls.lock().unwrap();
                    calls.push(meta.sequence_index);
                    calls.len() - 1
                };
                if self.failing_calls.contains(&position) {
                    return Err(BeamError::Io("connection reset".to_string()));
                }
                Ok(UploadReceipt {
                    secure_url: Url::parse(&format!(
                        "https://cdn.example.com/{}",
                        meta.name
                    ))
                    .unwrap(),
                })
            })
        }
    }

    fn batch() -> Batch {
        let mut batch = Batch::new();
        batch.push_bytes("a.png", "image/png", vec![1u8; 4]);
        batch.push_bytes("b.png", "image/png", vec![2u8; 5]);
        batch
    }

    #[tokio::test]
    async fn retries_only_the_failed_file() {
        let store = Arc::new(FlakyStore::new(vec![1]));
        let sender = RelaySender::new(
            store.clone(),
            RelayConfig { upload_attempts: 2 },
        );

        let payload = sender.share(&batch()).await.unwrap();
        assert_eq!(*store.calls.lock().unwrap(), vec![0, 1, 1]);
        assert!(payload
            .files()
            .iter()
            .all(|f| f.remote_locator.is_some()));
    }

    #[tokio::test]
    async fn single_attempt_aborts_the_batch() {
        let store = Arc::new(FlakyStore::new(vec![0]));
        let sender = RelaySender::new(store.clone(), RelayConfig::default());

        let err = sender.share(&batch()).await.unwrap_err();
        assert_eq!(
            err,
            BeamError::UploadFailed {
                index: 0,
                reason: "IO error: connection reset".to_string()
            }
        );
        assert_eq!(*store.calls.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn empty_batch_is_refused() {
        let sender = RelaySender::new(
            Arc::new(FlakyStore::new(vec![])),
            RelayConfig::default(),
        );
        assert!(matches!(
            sender.share(&Batch::new()).await,
            Err(BeamError::InvalidState(_))
        ));
    }
}
