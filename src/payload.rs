//! Signaling payload codec.
//!
//! The payload is the only thing the scannable code carries. It is JSON and
//! comes in two self-describing shapes:
//!
//! ```text
//! direct: {"mode":"DIRECT","sessionHostId":"..","files":[{name,size,mimeType,sequenceIndex}]}
//! relay:  {"files":[{name,size,mimeType,sequenceIndex,remoteLocator}],"createdAt":".."}
//! ```
//!
//! A direct payload is recognized by its `mode` tag (and requires a
//! `sessionHostId`); anything else with a `files` list is treated as a relay
//! payload and every file must carry a `remoteLocator`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{file::FileRecord, mode::SessionMode, BeamError, Result};

const DIRECT_TAG: &str = "DIRECT";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignalingPayload {
    Direct(DirectPayload),
    Relay(RelayPayload),
}

/// Everything a receiver needs to open a channel back to the sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectPayload {
    pub session_host_id: String,
    pub files: Vec<FileRecord>,
}

/// Everything a receiver needs to download a batch; no live session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayPayload {
    pub files: Vec<FileRecord>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectWire {
    mode: String,
    session_host_id: String,
    files: Vec<FileRecord>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayWire {
    files: Vec<FileRecord>,
    created_at: DateTime<Utc>,
}

impl SignalingPayload {
    /// Builds a validated direct payload. Locators are stripped.
    pub fn direct(
        session_host_id: impl Into<String>,
        files: Vec<FileRecord>,
    ) -> Result<Self> {
        let session_host_id = session_host_id.into();
        if session_host_id.trim().is_empty() {
            return Err(BeamError::InvalidState(
                "direct payload needs a session host id".to_string(),
            ));
        }
        let files = files
            .into_iter()
            .map(|mut f| {
                f.remote_locator = None;
                f
            })
            .collect::<Vec<_>>();
        validate_files(&files, false)
            .map_err(|e| BeamError::InvalidState(e.to_string()))?;
        Ok(Self::Direct(DirectPayload {
            session_host_id,
            files,
        }))
    }

    /// Builds a validated relay payload. Every file must carry a locator.
    pub fn relay(
        files: Vec<FileRecord>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        validate_files(&files, true)
            .map_err(|e| BeamError::InvalidState(e.to_string()))?;
        Ok(Self::Relay(RelayPayload { files, created_at }))
    }

    /// `encode(batch, mode, sessionHostId?)` in one call.
    pub fn build(
        mode: SessionMode,
        files: Vec<FileRecord>,
        session_host_id: Option<&str>,
    ) -> Result<Self> {
        match mode {
            SessionMode::Direct => {
                let host_id = session_host_id.ok_or_else(|| {
                    BeamError::InvalidState(
                        "direct payload needs a session host id".to_string(),
                    )
                })?;
                Self::direct(host_id, files)
            }
            SessionMode::Relay => Self::relay(files, Utc::now()),
        }
    }

    pub fn mode(&self) -> SessionMode {
        match self {
            SignalingPayload::Direct(_) => SessionMode::Direct,
            SignalingPayload::Relay(_) => SessionMode::Relay,
        }
    }

    pub fn files(&self) -> &[FileRecord] {
        match self {
            SignalingPayload::Direct(p) => &p.files,
            SignalingPayload::Relay(p) => &p.files,
        }
    }

    /// Serializes the payload into the string embedded in the code.
    pub fn encode(&self) -> Result<String> {
        let encoded = match self {
            SignalingPayload::Direct(p) => serde_json::to_string(&DirectWire {
                mode: DIRECT_TAG.to_string(),
                session_host_id: p.session_host_id.clone(),
                files: p.files.clone(),
            }),
            SignalingPayload::Relay(p) => serde_json::to_string(&RelayWire {
                files: p.files.clone(),
                created_at: p.created_at,
            }),
        };
        encoded.map_err(|e| BeamError::InvalidState(e.to_string()))
    }

    /// Parses a scanned string.
    ///
    /// Fails with [`BeamError::MalformedPayload`] when the string is not
    /// JSON and with [`BeamError::UnrecognizedShape`] when it is JSON that
    /// matches neither shape.
    pub fn decode(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|e| BeamError::MalformedPayload(e.to_string()))?;
        let object = value.as_object().ok_or_else(|| {
            BeamError::UnrecognizedShape("payload is not an object".into())
        })?;

        if object.contains_key("mode") || object.contains_key("sessionHostId")
        {
            let wire: DirectWire = serde_json::from_value(value)
                .map_err(|e| BeamError::UnrecognizedShape(e.to_string()))?;
            if wire.mode != DIRECT_TAG {
                return Err(BeamError::UnrecognizedShape(format!(
                    "unknown mode {:?}",
                    wire.mode
                )));
            }
            if wire.session_host_id.trim().is_empty() {
                return Err(BeamError::UnrecognizedShape(
                    "empty sessionHostId".to_string(),
                ));
            }
            validate_files(&wire.files, false)?;
            return Ok(Self::Direct(DirectPayload {
                session_host_id: wire.session_host_id,
                files: wire.files,
            }));
        }

        let wire: RelayWire = serde_json::from_value(value)
            .map_err(|e| BeamError::UnrecognizedShape(e.to_string()))?;
        validate_files(&wire.files, true)?;
        Ok(Self::Relay(RelayPayload {
            files: wire.files,
            created_at: wire.created_at,
        }))
    }
}

/// Checks the batch invariants shared by both shapes: non-empty, indices a
/// permutation of `0..n`, and locators present exactly in relay mode.
fn validate_files(files: &[FileRecord], relay: bool) -> Result<()> {
    if files.is_empty() {
        return Err(BeamError::UnrecognizedShape("empty file list".into()));
    }
    let mut seen = vec![false; files.len()];
    for file in files {
        let index = file.sequence_index;
        if index >= files.len() || seen[index] {
            return Err(BeamError::UnrecognizedShape(format!(
                "sequence indices are not a permutation of 0..{} (found {})",
                files.len(),
                index
            )));
        }
        seen[index] = true;
        match (relay, &file.remote_locator) {
            (true, None) => {
                return Err(BeamError::UnrecognizedShape(format!(
                    "file #{} has no remoteLocator",
                    index
                )));
            }
            (false, Some(_)) => {
                return Err(BeamError::UnrecognizedShape(format!(
                    "file #{} carries a remoteLocator in a direct payload",
                    index
                )));
            }
            _ => {}
        }
    }
    Ok(())
}
