//! Relay mode: files go through object storage, the code carries URLs.
//!
//! [`ObjectStore`] is the upload contract. [`HttpObjectStore`] talks to an
//! unsigned-upload image host: a multipart POST with a `file` part and an
//! `upload_preset` field, answered by JSON carrying `secure_url`.

pub mod receiver;
pub mod sender;

use std::{future::Future, pin::Pin};

use serde::Deserialize;
use url::Url;

use crate::{file::FileRecord, BeamError, Result};

pub use receiver::{RelayReceiver, RemoteFile};
pub use sender::{
    RelayConfig, RelaySendSubscriber, RelaySender, RelayUploadedEvent,
};

pub type UploadFuture<'a> =
    Pin<Box<dyn Future<Output = Result<UploadReceipt>> + Send + 'a>>;

/// What the store learns about a file besides its bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadMeta {
    pub name: String,
    pub mime_type: String,
    pub sequence_index: usize,
}

impl From<&FileRecord> for UploadMeta {
    fn from(record: &FileRecord) -> Self {
        Self {
            name: record.name.clone(),
            mime_type: record.mime_type.clone(),
            sequence_index: record.sequence_index,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    pub secure_url: Url,
}

pub trait ObjectStore: Send + Sync {
    fn upload<'a>(
        &'a self,
        bytes: Vec<u8>,
        meta: &'a UploadMeta,
    ) -> UploadFuture<'a>;
}

pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: Url,
    upload_preset: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: Url, upload_preset: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint, upload_preset)
    }

    pub fn with_client(
        client: reqwest::Client,
        endpoint: Url,
        upload_preset: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint,
            upload_preset: upload_preset.into(),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(
        &self,
        bytes: Vec<u8>,
        meta: &UploadMeta,
    ) -> Result<UploadReceipt> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(meta.name.clone())
            .mime_str(&meta.mime_type)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone());

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BeamError::Io(format!(
                "{} answered {}: {}",
                self.endpoint, status, body
            )));
        }
        parse_receipt(&body)
    }
}

impl ObjectStore for HttpObjectStore {
    fn upload<'a>(
        &'a self,
        bytes: Vec<u8>,
        meta: &'a UploadMeta,
    ) -> UploadFuture<'a> {
        Box::pin(self.post(bytes, meta))
    }
}

fn parse_receipt(body: &str) -> Result<UploadReceipt> {
    serde_json::from_str(body).map_err(|e| {
        BeamError::Io(format!(
            "upload response has no usable secure_url: {}",
            e
        ))
    })
}
