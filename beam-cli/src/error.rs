use beam_core::BeamError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid code: {0}")]
    InvalidCode(BeamError),

    #[error("relay mode needs relay.endpoint in the config or BEAM_RELAY_ENDPOINT")]
    RelayNotConfigured,

    #[error("transfer failed: {0}")]
    TransferFailed(BeamError),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("Could not render config: {0}")]
    ConfigRenderError(String),

    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error(transparent)]
    BeamError(#[from] BeamError),
}

impl AppError {
    /// Decode failures become "invalid code", anything else passes through.
    pub fn from_decode(e: BeamError) -> Self {
        if e.is_invalid_code() {
            AppError::InvalidCode(e)
        } else {
            AppError::BeamError(e)
        }
    }
}
