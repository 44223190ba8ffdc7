//! Receiver-side bookkeeping for one direct batch.
//!
//! META and FILE for the same index may arrive in either order: a FILE whose
//! META has not been seen yet is parked until its META shows up. A file
//! counts as arrived the moment both halves are present.

use std::collections::{BTreeMap, HashMap};

use crate::{
    file::{FileRecord, ReceivedFile},
    message::TransferMessage,
    BeamError, Result,
};

#[derive(Debug, Default)]
pub struct BatchSession {
    expected_count: Option<usize>,
    arrived_meta: HashMap<usize, FileRecord>,
    arrived_bytes: HashMap<usize, Vec<u8>>,
    resolved: BTreeMap<usize, ReceivedFile>,
}

impl BatchSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected_count(&self) -> Option<usize> {
        self.expected_count
    }

    pub fn arrived_count(&self) -> usize {
        self.resolved.len()
    }

    /// The metadata seen so far for `index`.
    pub fn record(&self, index: usize) -> Option<&FileRecord> {
        self.resolved
            .get(&index)
            .map(|f| &f.record)
            .or_else(|| self.arrived_meta.get(&index))
    }

    /// True once `BATCH_START` declared a non-zero count and that many
    /// files have arrived.
    pub fn is_complete(&self) -> bool {
        match self.expected_count {
            Some(expected) => expected > 0 && self.resolved.len() == expected,
            None => false,
        }
    }

    /// Applies one incoming message. Returns the index of the file that
    /// became complete because of it, if any.
    pub fn apply(&mut self, message: TransferMessage) -> Result<Option<usize>> {
        match message {
            TransferMessage::BatchStart { count } => {
                self.start(count)?;
                Ok(None)
            }
            TransferMessage::Meta {
                sequence_index,
                name,
                size,
                mime_type,
            } => {
                self.check_range(sequence_index)?;
                if self.arrived_meta.contains_key(&sequence_index) {
                    return Err(BeamError::ProtocolViolation(format!(
                        "duplicate META for file #{}",
                        sequence_index
                    )));
                }
                let record =
                    FileRecord::new(sequence_index, name, size, mime_type);
                self.arrived_meta.insert(sequence_index, record);
                match self.arrived_bytes.remove(&sequence_index) {
                    Some(bytes) => self.resolve(sequence_index, bytes),
                    None => Ok(None),
                }
            }
            TransferMessage::File {
                sequence_index,
                bytes,
            } => {
                self.check_range(sequence_index)?;
                if self.resolved.contains_key(&sequence_index)
                    || self.arrived_bytes.contains_key(&sequence_index)
                {
                    return Err(BeamError::ProtocolViolation(format!(
                        "duplicate FILE for file #{}",
                        sequence_index
                    )));
                }
                if self.arrived_meta.contains_key(&sequence_index) {
                    self.resolve(sequence_index, bytes)
                } else {
                    log::trace!(
                        "parking {} bytes for file #{} until its META arrives",
                        bytes.len(),
                        sequence_index
                    );
                    self.arrived_bytes
                        .insert(sequence_index, bytes);
                    Ok(None)
                }
            }
        }
    }

    /// Hands out the reconstructed files ordered by `sequence_index`.
    pub fn into_files(self) -> Result<Vec<ReceivedFile>> {
        if !self.is_complete() {
            return Err(BeamError::InvalidState(format!(
                "batch incomplete: {} of {:?} files arrived",
                self.resolved.len(),
                self.expected_count
            )));
        }
        Ok(self.resolved.into_values().collect())
    }

    fn start(&mut self, count: usize) -> Result<()> {
        if self.expected_count.is_some() {
            return Err(BeamError::ProtocolViolation(
                "BATCH_START received twice".to_string(),
            ));
        }
        if count == 0 {
            return Err(BeamError::ProtocolViolation(
                "BATCH_START announced an empty batch".to_string(),
            ));
        }
        let seen = self
            .arrived_meta
            .keys()
            .chain(self.arrived_bytes.keys())
            .copied()
            .max();
        if let Some(max) = seen {
            if max >= count {
                return Err(BeamError::ProtocolViolation(format!(
                    "file #{} is outside a batch of {}",
                    max, count
                )));
            }
        }
        self.expected_count = Some(count);
        Ok(())
    }

    fn check_range(&self, sequence_index: usize) -> Result<()> {
        match self.expected_count {
            Some(expected) if sequence_index >= expected => {
                Err(BeamError::ProtocolViolation(format!(
                    "file #{} is outside a batch of {}",
                    sequence_index, expected
                )))
            }
            _ => Ok(()),
        }
    }

    fn resolve(
        &mut self,
        sequence_index: usize,
        bytes: Vec<u8>,
    ) -> Result<Option<usize>> {
        let record = match self.arrived_meta.get(&sequence_index) {
            Some(record) => record.clone(),
            None => {
                return Err(BeamError::InvalidState(format!(
                    "no META for file #{}",
                    sequence_index
                )))
            }
        };
        if record.size != bytes.len() as u64 {
            return Err(BeamError::ProtocolViolation(format!(
                "file #{} announced {} bytes but carried {}",
                sequence_index,
                record.size,
                bytes.len()
            )));
        }
        self.resolved
            .insert(sequence_index, ReceivedFile { record, bytes });
        Ok(Some(sequence_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(index: usize, size: u64) -> TransferMessage {
        TransferMessage::Meta {
            sequence_index: index,
            name: format!("file-{}", index),
            size,
            mime_type: "application/octet-stream".to_string(),
        }
    }

    fn file(index: usize, len: usize) -> TransferMessage {
        TransferMessage::File {
            sequence_index: index,
            bytes: vec![index as u8; len],
        }
    }

    #[test]
    fn completes_in_send_order() {
        let mut batch = BatchSession::new();
        let start = TransferMessage::BatchStart { count: 2 };
        assert_eq!(batch.apply(start).unwrap(), None);
        assert_eq!(batch.apply(meta(0, 10)).unwrap(), None);
        assert_eq!(batch.apply(file(0, 10)).unwrap(), Some(0));
        assert!(!batch.is_complete());
        assert_eq!(batch.apply(meta(1, 20)).unwrap(), None);
        assert_eq!(batch.apply(file(1, 20)).unwrap(), Some(1));
        assert!(batch.is_complete());

        let files = batch.into_files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].bytes, vec![1u8; 20]);
    }

    #[test]
    fn file_before_meta_is_parked() {
        let mut batch = BatchSession::new();
        batch
            .apply(TransferMessage::BatchStart { count: 1 })
            .unwrap();
        assert_eq!(batch.apply(file(0, 4)).unwrap(), None);
        assert_eq!(batch.arrived_count(), 0);
        assert_eq!(batch.apply(meta(0, 4)).unwrap(), Some(0));
        assert!(batch.is_complete());
    }

    #[test]
    fn never_complete_without_batch_start() {
        let mut batch = BatchSession::new();
        batch.apply(meta(0, 1)).unwrap();
        batch.apply(file(0, 1)).unwrap();
        assert_eq!(batch.arrived_count(), 1);
        assert!(!batch.is_complete());
        assert!(batch.into_files().is_err());
    }

    #[test]
    fn late_batch_start_completes_an_already_full_batch() {
        let mut batch = BatchSession::new();
        batch.apply(meta(0, 1)).unwrap();
        batch.apply(file(0, 1)).unwrap();
        batch
            .apply(TransferMessage::BatchStart { count: 1 })
            .unwrap();
        assert!(batch.is_complete());
    }

    #[test]
    fn rejects_broken_batches() {
        let mut batch = BatchSession::new();
        batch
            .apply(TransferMessage::BatchStart { count: 1 })
            .unwrap();
        assert!(matches!(
            batch.apply(TransferMessage::BatchStart { count: 1 }),
            Err(BeamError::ProtocolViolation(_))
        ));
        assert!(matches!(
            batch.apply(meta(1, 1)),
            Err(BeamError::ProtocolViolation(_))
        ));
        batch.apply(meta(0, 3)).unwrap();
        assert!(matches!(
            batch.apply(meta(0, 3)),
            Err(BeamError::ProtocolViolation(_))
        ));
        assert!(matches!(
            batch.apply(file(0, 2)),
            Err(BeamError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn rejects_empty_and_undersized_batch_start() {
        let mut batch = BatchSession::new();
        assert!(batch
            .apply(TransferMessage::BatchStart { count: 0 })
            .is_err());

        let mut batch = BatchSession::new();
        batch.apply(file(3, 1)).unwrap();
        assert!(batch
            .apply(TransferMessage::BatchStart { count: 2 })
            .is_err());
    }

    #[test]
    fn duplicate_file_is_rejected_even_when_parked() {
        let mut batch = BatchSession::new();
        batch.apply(file(0, 1)).unwrap();
        assert!(batch.apply(file(0, 1)).is_err());
    }
}
