//! Scan-to-share file transfer.
//!
//! A sender turns a [`file::Batch`] into a [`payload::SignalingPayload`],
//! small enough to fit a scannable code. The receiver decodes it and either
//! opens a live channel back to the sender ([`direct`]) or downloads the
//! files the sender already put into object storage ([`relay`]).
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use beam_core::{
//!     channel::memory::MemoryHub, direct::DirectReceiver,
//!     direct::DirectSender, file::Batch, SignalingPayload,
//! };
//!
//! # async fn demo() -> beam_core::Result<()> {
//! let hub = MemoryHub::new();
//! let mut batch = Batch::new();
//! batch.push_bytes("hello.txt", "text/plain", b"hello".to_vec());
//!
//! let mut sender = DirectSender::new(Arc::new(hub.peer()), batch);
//! let code = sender.share()?.encode()?;
//!
//! let mut receiver = DirectReceiver::new(Arc::new(hub.peer()));
//! receiver.accept_payload(SignalingPayload::decode(&code)?)?;
//! let files = receiver.wait().await?;
//! assert_eq!(files[0].bytes, b"hello");
//! # Ok(())
//! # }
//! ```

pub mod advisory;
pub mod batch;
pub mod channel;
pub mod config;
pub mod direct;
pub mod errors;
pub mod file;
pub mod message;
pub mod mode;
pub mod payload;
pub mod relay;
pub mod subscribers;

pub use errors::{BeamError, Result};
pub use file::{Batch, FileRecord, ReceivedFile};
pub use message::TransferMessage;
pub use mode::{ModeSelector, SessionMode};
pub use payload::SignalingPayload;
