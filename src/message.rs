//! Messages exchanged over a direct channel.
//!
//! A batch is always announced by exactly one `BATCH_START`, followed by one
//! `META` and one `FILE` per file. Each message is a JSON object tagged by
//! `type`; file contents travel base64-encoded.
//!
//! Unknown tags are rejected as malformed rather than skipped.

use serde::{Deserialize, Serialize};

use crate::{file::FileRecord, BeamError, Result};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferMessage {
    /// Declares how many files follow.
    BatchStart { count: usize },
    Meta {
        #[serde(rename = "sequenceIndex")]
        sequence_index: usize,
        name: String,
        size: u64,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// The whole content of one file.
    File {
        #[serde(rename = "sequenceIndex")]
        sequence_index: usize,
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
    },
}

impl TransferMessage {
    pub fn meta(record: &FileRecord) -> Self {
        TransferMessage::Meta {
            sequence_index: record.sequence_index,
            name: record.name.clone(),
            size: record.size,
            mime_type: record.mime_type.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransferMessage::BatchStart { .. } => "BATCH_START",
            TransferMessage::Meta { .. } => "META",
            TransferMessage::File { .. } => "FILE",
        }
    }

    pub fn to_frame(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| BeamError::InvalidState(e.to_string()))
    }

    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        serde_json::from_slice(frame)
            .map_err(|e| BeamError::MalformedPayload(e.to_string()))
    }
}

// File contents can be large; keep them out of debug output.
impl std::fmt::Debug for TransferMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferMessage::BatchStart { count } => f
                .debug_struct("BatchStart")
                .field("count", count)
                .finish(),
            TransferMessage::Meta {
                sequence_index,
                name,
                size,
                mime_type,
            } => f
                .debug_struct("Meta")
                .field("sequence_index", sequence_index)
                .field("name", name)
                .field("size", size)
                .field("mime_type", mime_type)
                .finish(),
            TransferMessage::File {
                sequence_index,
                bytes,
            } => f
                .debug_struct("File")
                .field("sequence_index", sequence_index)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &[u8],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
