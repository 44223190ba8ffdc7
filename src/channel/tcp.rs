//! Peer provider over plain TCP.
//!
//! The session host id is the `host:port` a receiver dials. Each frame on
//! the wire is an 8-byte big-endian length followed by the frame bytes.
//! Reading and writing run in their own tasks so that [`PeerLink`] stays a
//! pair of bounded buffers, exactly like the in-memory provider.

use std::net::SocketAddr;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    sync::mpsc,
};

use super::{
    LinkEvent, LinkFuture, PeerLink, PeerProvider, DEFAULT_LINK_CAPACITY,
};
use crate::{BeamError, Result};

/// Largest frame a peer may announce unless configured otherwise.
pub const DEFAULT_MAX_FRAME_LEN: u64 = 1 << 30;

/// Frame bodies are read in steps of at most this many bytes, so memory
/// only grows as data actually arrives.
const READ_CHUNK: usize = 64 * 1024;

#[derive(Clone, Debug)]
pub struct TcpConfig {
    /// Frames buffered per direction.
    pub capacity: usize,
    /// Frames announcing more than this many bytes break the link.
    pub max_frame_len: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_LINK_CAPACITY,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

pub struct TcpPeer {
    /// `None` for a peer that only dials out.
    listener: Option<TcpListener>,
    local_id: String,
    config: TcpConfig,
}

impl TcpPeer {
    /// Listens on `bind`. When `advertise` is given it replaces the host
    /// part of the session host id (useful when binding `0.0.0.0`).
    pub async fn bind(
        bind: &str,
        advertise: Option<&str>,
        config: TcpConfig,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind).await?;
        let local_addr = listener.local_addr()?;
        let local_id = match advertise {
            Some(host) => format!("{}:{}", host, local_addr.port()),
            None => local_addr.to_string(),
        };
        log::info!("listening for peers on {} as {}", local_addr, local_id);
        Ok(Self {
            listener: Some(listener),
            local_id,
            config,
        })
    }

    /// A peer that can dial others but opens no listening port.
    pub fn dialer(config: TcpConfig) -> Self {
        Self {
            listener: None,
            local_id: String::new(),
            config,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener()?.local_addr()?)
    }

    fn listener(&self) -> Result<&TcpListener> {
        self.listener.as_ref().ok_or_else(|| {
            BeamError::InvalidState("peer only dials out".to_string())
        })
    }

    fn spawn_link(&self, stream: TcpStream, remote_id: String) -> PeerLink {
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("could not disable nagle for {}: {}", remote_id, e);
        }
        let (read_half, write_half) = stream.into_split();
        let (out_tx, out_rx) = mpsc::channel(self.config.capacity.max(1));
        let (in_tx, in_rx) = mpsc::channel(self.config.capacity.max(1));
        tokio::spawn(write_frames(write_half, out_rx));
        tokio::spawn(read_frames(
            read_half,
            in_tx,
            self.config.max_frame_len,
        ));
        PeerLink::new(remote_id, out_tx, in_rx)
    }
}

impl PeerProvider for TcpPeer {
    fn local_id(&self) -> String {
        self.local_id.clone()
    }

    fn connect<'a>(&'a self, remote_id: &'a str) -> LinkFuture<'a> {
        Box::pin(async move {
            let stream = TcpStream::connect(remote_id).await.map_err(|e| {
                BeamError::LinkLost(format!(
                    "could not reach {}: {}",
                    remote_id, e
                ))
            })?;
            log::debug!("connected to {}", remote_id);
            Ok(self.spawn_link(stream, remote_id.to_string()))
        })
    }

    fn accept(&self) -> LinkFuture<'_> {
        Box::pin(async move {
            let (stream, addr) = self
                .listener()?
                .accept()
                .await
                .map_err(|e| BeamError::LinkLost(e.to_string()))?;
            log::debug!("accepted connection from {}", addr);
            Ok(self.spawn_link(stream, addr.to_string()))
        })
    }
}

async fn write_frames(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<LinkEvent>,
) {
    while let Some(event) = outbound.recv().await {
        match event {
            LinkEvent::Frame(frame) => {
                let header = (frame.len() as u64).to_be_bytes();
                let written = async {
                    writer.write_all(&header).await?;
                    writer.write_all(&frame).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = written {
                    log::warn!("write failed: {}", e);
                    return;
                }
            }
            LinkEvent::Closed => break,
            LinkEvent::Failed(reason) => {
                log::debug!("tearing link down: {}", reason);
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_frames(
    mut reader: OwnedReadHalf,
    inbound: mpsc::Sender<LinkEvent>,
    max_frame_len: u64,
) {
    loop {
        let event = match read_frame(&mut reader, max_frame_len).await {
            Ok(Some(frame)) => LinkEvent::Frame(frame),
            Ok(None) => LinkEvent::Closed,
            Err(reason) => LinkEvent::Failed(reason),
        };
        let last = !matches!(event, LinkEvent::Frame(_));
        if inbound.send(event).await.is_err() || last {
            return;
        }
    }
}

/// `Ok(None)` on a clean end of stream between frames.
async fn read_frame(
    reader: &mut OwnedReadHalf,
    max_frame_len: u64,
) -> std::result::Result<Option<Vec<u8>>, String> {
    let mut header = [0u8; 8];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Ok(None);
        }
        Err(e) => return Err(e.to_string()),
    }
    let len = u64::from_be_bytes(header);
    if len > max_frame_len {
        return Err(format!(
            "frame of {} bytes exceeds the {} byte limit",
            len, max_frame_len
        ));
    }
    let expected = usize::try_from(len).map_err(|e| e.to_string())?;
    let mut frame = Vec::with_capacity(expected.min(READ_CHUNK));
    let read = reader
        .take(len)
        .read_to_end(&mut frame)
        .await
        .map_err(|e| format!("connection dropped mid-frame: {}", e))?;
    if read != expected {
        return Err(format!(
            "connection dropped mid-frame after {} of {} bytes",
            read, expected
        ));
    }
    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::TransferMessage;

    async fn local_peer(config: TcpConfig) -> TcpPeer {
        TcpPeer::bind("127.0.0.1:0", None, config)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn frames_cross_a_real_socket() {
        let host = local_peer(TcpConfig::default()).await;
        let guest = local_peer(TcpConfig::default()).await;
        let host_id = host.local_id();

        let (dialed, accepted) =
            tokio::join!(guest.connect(&host_id), host.accept());
        let outbound = dialed.unwrap();
        let mut inbound = accepted.unwrap();

        let bytes: Vec<u8> = (0..100_000u32).map(|i| i as u8).collect();
        outbound
            .send(&TransferMessage::File {
                sequence_index: 0,
                bytes: bytes.clone(),
            })
            .await
            .unwrap();
        let closer = tokio::spawn(outbound.close());

        assert_eq!(
            inbound.recv().await.unwrap(),
            Some(TransferMessage::File {
                sequence_index: 0,
                bytes
            })
        );
        assert_eq!(inbound.recv().await.unwrap(), None);
        drop(inbound);
        closer.await.unwrap();
    }

    #[tokio::test]
    async fn oversized_frames_break_the_link() {
        let host = local_peer(TcpConfig {
            max_frame_len: 16,
            ..TcpConfig::default()
        })
        .await;
        let guest = local_peer(TcpConfig::default()).await;
        let host_id = host.local_id();

        let (dialed, accepted) =
            tokio::join!(guest.connect(&host_id), host.accept());
        let outbound = dialed.unwrap();
        let mut inbound = accepted.unwrap();

        outbound
            .send(&TransferMessage::BatchStart { count: 12345 })
            .await
            .unwrap();
        assert!(matches!(
            inbound.recv().await,
            Err(BeamError::LinkLost(_))
        ));
    }

    #[tokio::test]
    async fn stray_traffic_breaks_only_its_own_link() {
        let host = local_peer(TcpConfig::default()).await;
        let addr = host.local_addr().unwrap();

        let mut stray = TcpStream::connect(addr).await.unwrap();
        stray
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut link = host.accept().await.unwrap();
        assert!(matches!(link.recv().await, Err(BeamError::LinkLost(_))));
    }

    #[tokio::test]
    async fn truncated_frame_is_link_lost() {
        let host = local_peer(TcpConfig::default()).await;
        let addr = host.local_addr().unwrap();

        let mut stray = TcpStream::connect(addr).await.unwrap();
        stray.write_all(&1000u64.to_be_bytes()).await.unwrap();
        stray.write_all(&[1u8; 10]).await.unwrap();
        drop(stray);

        let mut link = host.accept().await.unwrap();
        assert!(matches!(link.recv().await, Err(BeamError::LinkLost(_))));
    }

    #[tokio::test]
    async fn dialer_reaches_a_listener_without_listening() {
        let host = local_peer(TcpConfig::default()).await;
        let guest = TcpPeer::dialer(TcpConfig::default());
        assert!(matches!(
            guest.local_addr(),
            Err(BeamError::InvalidState(_))
        ));
        assert!(matches!(
            guest.accept().await,
            Err(BeamError::InvalidState(_))
        ));

        let host_id = host.local_id();
        let (dialed, accepted) =
            tokio::join!(guest.connect(&host_id), host.accept());
        let outbound = dialed.unwrap();
        let mut inbound = accepted.unwrap();
        outbound
            .send(&TransferMessage::BatchStart { count: 1 })
            .await
            .unwrap();
        assert_eq!(
            inbound.recv().await.unwrap(),
            Some(TransferMessage::BatchStart { count: 1 })
        );
    }

    #[tokio::test]
    async fn advertised_host_replaces_bind_host() {
        let peer = TcpPeer::bind(
            "127.0.0.1:0",
            Some("beam.local"),
            TcpConfig::default(),
        )
        .await
        .unwrap();
        let port = peer.local_addr().unwrap().port();
        assert_eq!(peer.local_id(), format!("beam.local:{}", port));
    }

    #[tokio::test]
    async fn dialing_a_closed_port_is_link_lost() {
        let port = {
            let peer = local_peer(TcpConfig::default()).await;
            peer.local_addr().unwrap().port()
        };
        let guest = local_peer(TcpConfig::default()).await;
        let err = guest
            .connect(&format!("127.0.0.1:{}", port))
            .await
            .unwrap_err();
        assert!(matches!(err, BeamError::LinkLost(_)));
    }
}
