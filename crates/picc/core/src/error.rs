//! Core error type for all PICC operations
//!
//! The first group of variants are communication errors: the frame never made
//! it across the air interface intact. Everything else means the card answered,
//! but not the way the protocol expects.

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    //
    // Communication errors
    //
    /// The card did not answer within the frame waiting time
    #[error("PICC timeout: card did not respond")]
    PiccTimeout,

    /// The reader chip did not finish the command
    #[error("PCD timeout: reader did not respond")]
    PcdTimeout,

    /// Received frame failed the CRC_A check
    #[error("Incorrect CRC in received frame")]
    IncorrectCrc,

    /// More than one card answered at once
    #[error("Collision: multiple cards detected")]
    Collision,

    /// Any other failure reported by the reader driver
    #[error("Communication error: {0}")]
    Communication(&'static str),

    //
    // Protocol errors
    //
    /// The card answered with data that does not fit the protocol
    #[error("Unexpected data: {0}")]
    UnexpectedData(&'static str),

    /// The card answered with a 4-bit MIFARE NAK
    #[error("MIFARE NAK {0:#04x}")]
    MifareNak(u8),

    /// Crypto1 or three pass authentication was rejected
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Caller supplied a value the command cannot encode
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    //
    // General errors
    //
    /// Context error with message and source error
    #[error("{context}: {source}")]
    Context {
        /// Contextual message
        context: String,
        /// Source error
        source: Box<Self>,
    },
}

impl Error {
    /// Create a new error with context information
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a new unexpected data error
    pub const fn unexpected(message: &'static str) -> Self {
        Self::UnexpectedData(message)
    }

    /// Create a new invalid argument error
    pub const fn invalid_argument(message: &'static str) -> Self {
        Self::InvalidArgument(message)
    }

    /// The innermost error, with all context layers removed
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the frame was lost or damaged on the air interface
    pub fn is_communication(&self) -> bool {
        matches!(
            self.root(),
            Self::PiccTimeout
                | Self::PcdTimeout
                | Self::IncorrectCrc
                | Self::Collision
                | Self::Communication(_)
        )
    }

    /// Whether the card stayed silent
    pub fn is_picc_timeout(&self) -> bool {
        matches!(self.root(), Self::PiccTimeout)
    }
}

/// Result type for PICC operations
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for Result with PICC Errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, context: S) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context<S: Into<String>>(self, context: S) -> Self {
        self.map_err(|e| e.with_context(context))
    }
}
