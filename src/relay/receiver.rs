use futures::future::try_join_all;
use log::{debug, warn};
use url::Url;

use crate::{
    file::{FileRecord, ReceivedFile},
    payload::SignalingPayload,
    BeamError, Result,
};

/// A relay file, ready to be fetched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFile {
    pub record: FileRecord,
    pub locator: Url,
}

/// The receiving side of relay mode holds no session: a decoded payload is
/// already the list of files. Downloads are independent of each other.
#[derive(Clone, Default)]
pub struct RelayReceiver {
    client: reqwest::Client,
}

impl RelayReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Files of a relay payload in `sequence_index` order.
    pub fn files(payload: &SignalingPayload) -> Result<Vec<RemoteFile>> {
        let payload = match payload {
            SignalingPayload::Relay(payload) => payload,
            SignalingPayload::Direct(_) => {
                return Err(BeamError::InvalidState(
                    "direct payloads have nothing to download".to_string(),
                ))
            }
        };
        let mut files = payload
            .files
            .iter()
            .map(|record| {
                let locator = record.remote_locator.clone().ok_or_else(|| {
                    BeamError::UnrecognizedShape(format!(
                        "file #{} has no remoteLocator",
                        record.sequence_index
                    ))
                })?;
                Ok(RemoteFile {
                    record: record.clone(),
                    locator,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        files.sort_by_key(|f| f.record.sequence_index);
        Ok(files)
    }

    pub async fn download(&self, file: &RemoteFile) -> Result<ReceivedFile> {
        debug!("downloading {} from {}", file.record.name, file.locator);
        let response = self
            .client
            .get(file.locator.clone())
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?.to_vec();
        if bytes.len() as u64 != file.record.size {
            // image hosts may re-encode uploads
            warn!(
                "{} is {} bytes, the payload announced {}",
                file.record.name,
                bytes.len(),
                file.record.size
            );
        }
        Ok(ReceivedFile {
            record: file.record.clone(),
            bytes,
        })
    }

    /// Fetches every file concurrently; the first failure wins.
    pub async fn download_all(
        &self,
        files: &[RemoteFile],
    ) -> Result<Vec<ReceivedFile>> {
        try_join_all(files.iter().map(|f| self.download(f))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    /// Serves `body` for every request until dropped.
    async fn serve(body: &'static [u8]) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        let n = stream.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            return;
                        }
                        request.extend_from_slice(&chunk[..n]);
                    }
                    let head = format!(
                        "HTTP/1.1 200 OK\r\n\
                         Content-Length: {}\r\n\
                         Connection: close\r\n\r\n",
                        body.len()
                    );
                    stream.write_all(head.as_bytes()).await.unwrap();
                    stream.write_all(body).await.unwrap();
                });
            }
        });
        Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    fn relay_payload(base: &Url) -> SignalingPayload {
        SignalingPayload::relay(
            vec![
                FileRecord::new(1, "b.png", 5, "image/png")
                    .with_locator(base.join("b.png").unwrap()),
                FileRecord::new(0, "a.png", 5, "image/png")
                    .with_locator(base.join("a.png").unwrap()),
            ],
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn lists_files_in_index_order() {
        let base = Url::parse("https://cdn.example.com/").unwrap();
        let files = RelayReceiver::files(&relay_payload(&base)).unwrap();
        assert_eq!(files[0].record.name, "a.png");
        assert_eq!(files[1].locator.as_str(), "https://cdn.example.com/b.png");
    }

    #[test]
    fn direct_payloads_are_refused() {
        let direct = SignalingPayload::direct(
            "host",
            vec![FileRecord::new(0, "a", 1, "text/plain")],
        )
        .unwrap();
        assert!(RelayReceiver::files(&direct).is_err());
    }

    #[tokio::test]
    async fn downloads_every_file() {
        let base = serve(b"hello").await;
        let files = RelayReceiver::files(&relay_payload(&base)).unwrap();

        let received = RelayReceiver::new().download_all(&files).await.unwrap();
        assert_eq!(received.len(), 2);
        assert!(received.iter().all(|f| f.bytes == b"hello"));
        assert_eq!(received[1].record.sequence_index, 1);
    }
}
