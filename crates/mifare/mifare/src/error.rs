//! Error types for the MIFARE command layers

use crate::desfire::Status;

/// Errors raised by the MIFARE command layers
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// Type A layer error
    #[error(transparent)]
    Picc(#[from] nexum_picc_core::Error),

    /// ISO 14443-4 layer error
    #[error(transparent)]
    Iso14443(#[from] nexum_picc_iso14443::Error),

    /// Command needs an authenticated session
    #[error("Not authenticated")]
    Unauthenticated,

    /// Card answered with an error status; the session is gone
    #[error("Card returned status {0}")]
    ReceiptStatus(Status),

    /// CMAC or CRC of the card's answer did not verify; the session is gone
    #[error("Response integrity check failed")]
    ReceiptIntegrity,

    /// Card answered with data that does not fit the command
    #[error("Unexpected data: {0}")]
    UnexpectedData(&'static str),

    /// Key material of the wrong size or type
    #[error("Invalid key: {0}")]
    InvalidKey(&'static str),

    /// Caller supplied a value the command cannot encode
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl Error {
    /// Whether the frame was lost or damaged on the air interface
    pub fn is_communication(&self) -> bool {
        match self {
            Self::Picc(e) => e.is_communication(),
            Self::Iso14443(nexum_picc_iso14443::Error::Picc(e)) => e.is_communication(),
            _ => false,
        }
    }

    /// Status byte of a [`ReceiptStatus`](Self::ReceiptStatus) error
    pub const fn status(&self) -> Option<Status> {
        match self {
            Self::ReceiptStatus(status) => Some(*status),
            _ => None,
        }
    }
}

impl From<cipher::InvalidLength> for Error {
    fn from(_: cipher::InvalidLength) -> Self {
        Self::InvalidKey("invalid key or IV length")
    }
}

/// Result type for MIFARE operations
pub type Result<T> = std::result::Result<T, Error>;
