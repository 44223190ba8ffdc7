//! Choosing between a direct session and the cloud relay.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    file::{Batch, FileRecord},
    payload::SignalingPayload,
    BeamError, Result,
};

/// Batches up to this size may go through the relay when they are media.
pub const DEFAULT_RELAY_RECOMMEND_MAX_BYTES: u64 = 10 * 1024 * 1024;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Live peer-to-peer channel between the two devices.
    #[default]
    Direct,
    /// Upload to object storage, receiver downloads by URL.
    Relay,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Direct => write!(f, "direct"),
            SessionMode::Relay => write!(f, "relay"),
        }
    }
}

impl FromStr for SessionMode {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "p2p" => Ok(SessionMode::Direct),
            "relay" | "cloud" => Ok(SessionMode::Relay),
            other => Err(BeamError::Config(format!(
                "unknown mode {:?} (expected direct or relay)",
                other
            ))),
        }
    }
}

impl SessionMode {
    /// Large or non-media batches go direct; small media batches may use
    /// the relay, which keeps a preview-friendly copy in the cloud.
    pub fn recommend(files: &[FileRecord], relay_max_bytes: u64) -> Self {
        let total: u64 = files.iter().map(|f| f.size).sum();
        if !files.is_empty()
            && files.iter().all(FileRecord::is_media)
            && total <= relay_max_bytes
        {
            SessionMode::Relay
        } else {
            SessionMode::Direct
        }
    }

    /// Which controller a receiver hands a decoded payload to.
    pub fn dispatch(payload: &SignalingPayload) -> Self {
        payload.mode()
    }
}

/// Holds the user's current choice for the next share.
///
/// Changing the mode throws away a payload built for the previous mode.
/// While a session runs the selector is locked and refuses changes.
#[derive(Debug, Default)]
pub struct ModeSelector {
    mode: SessionMode,
    pending: Option<SignalingPayload>,
    locked: bool,
}

impl ModeSelector {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_mode(&mut self, mode: SessionMode) -> Result<()> {
        if self.locked {
            return Err(BeamError::InvalidState(
                "cannot switch mode while a session is running".to_string(),
            ));
        }
        if mode != self.mode {
            if self.pending.take().is_some() {
                log::debug!(
                    "discarding {} payload after mode switch",
                    self.mode
                );
            }
            self.mode = mode;
        }
        Ok(())
    }

    /// The controller to activate for `batch`.
    pub fn select(&self, batch: &Batch) -> Result<SessionMode> {
        if batch.is_empty() {
            return Err(BeamError::InvalidState(
                "nothing selected to share".to_string(),
            ));
        }
        Ok(self.mode)
    }

    /// Keeps the payload built for the current mode until it is shared.
    pub fn hold(&mut self, payload: SignalingPayload) -> Result<()> {
        if payload.mode() != self.mode {
            return Err(BeamError::InvalidState(format!(
                "payload is {} but the selected mode is {}",
                payload.mode(),
                self.mode
            )));
        }
        self.pending = Some(payload);
        Ok(())
    }

    pub fn pending(&self) -> Option<&SignalingPayload> {
        self.pending.as_ref()
    }

    pub fn begin_session(&mut self) {
        self.locked = true;
    }

    pub fn end_session(&mut self) {
        self.locked = false;
        self.pending = None;
    }
}
