use thiserror::Error;

pub type Result<T> = std::result::Result<T, BeamError>;

/// Every failure the core can hand back to its caller.
///
/// Variants carry strings rather than source errors so that a failure can
/// be embedded in a published session state and cloned to every observer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BeamError {
    /// The scanned string is not structured data at all.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    /// The scanned string parses but matches neither payload shape.
    #[error("Unrecognized payload shape: {0}")]
    UnrecognizedShape(String),
    /// The direct channel errored or closed before the batch finished.
    #[error("Link lost: {0}")]
    LinkLost(String),
    /// A relay upload failed; the whole batch is abandoned.
    #[error("Upload of file #{index} failed: {reason}")]
    UploadFailed { index: usize, reason: String },
    #[error("Camera unavailable")]
    CameraUnavailable,
    /// A well-formed message that breaks the batch rules.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BeamError {
    /// Decode-time failures, shown to a user as "invalid code".
    pub fn is_invalid_code(&self) -> bool {
        matches!(
            self,
            BeamError::MalformedPayload(_) | BeamError::UnrecognizedShape(_)
        )
    }
}

impl From<std::io::Error> for BeamError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for BeamError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedPayload(e.to_string())
    }
}

impl From<toml::de::Error> for BeamError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for BeamError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<url::ParseError> for BeamError {
    fn from(e: url::ParseError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<reqwest::Error> for BeamError {
    fn from(e: reqwest::Error) -> Self {
        Self::Io(e.to_string())
    }
}
