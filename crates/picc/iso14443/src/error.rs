//! Error type for the block transmission protocol

/// Errors raised by the ISO 14443-4 layer
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// Error from the type A layer below
    #[error(transparent)]
    Picc(#[from] nexum_picc_core::Error),

    /// Card has not been selected at layer 4
    #[error("Card not selected at ISO 14443-4 level")]
    NotSelected,

    /// Card kept acknowledging the wrong block
    #[error("Retransmission limit reached")]
    RetransmissionLimit,

    /// Malformed answer to select
    #[error("Invalid ATS: {0}")]
    InvalidAts(&'static str),
}

impl Error {
    /// Create a new unexpected data error
    pub const fn unexpected(message: &'static str) -> Self {
        Self::Picc(nexum_picc_core::Error::UnexpectedData(message))
    }

    /// Whether the card stayed silent
    pub fn is_picc_timeout(&self) -> bool {
        matches!(self, Self::Picc(e) if e.is_picc_timeout())
    }
}

/// Result type for ISO 14443-4 operations
pub type Result<T> = std::result::Result<T, Error>;
