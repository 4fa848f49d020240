//! DESFire status codes

use std::fmt;

use tracing::Level;

/// Status byte returned as the first byte of every DESFire answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub u8);

impl Status {
    /// Operation completed
    pub const SUCCESS: Self = Self(0x00);
    /// No changes made; authentication state revoked
    pub const NO_CHANGES: Self = Self(0x0C);
    /// Insufficient NV memory
    pub const OUT_OF_MEMORY: Self = Self(0x0E);
    /// Command code not supported
    pub const ILLEGAL_COMMAND: Self = Self(0x1C);
    /// CRC or MAC mismatch
    pub const INTEGRITY_ERROR: Self = Self(0x1E);
    /// Invalid key number
    pub const NO_SUCH_KEY: Self = Self(0x40);
    /// Invalid command length
    pub const LENGTH_ERROR: Self = Self(0x7E);
    /// Configuration or state does not allow the command
    pub const PERMISSION_DENIED: Self = Self(0x9D);
    /// Invalid parameter value
    pub const PARAMETER_ERROR: Self = Self(0x9E);
    /// Application not present
    pub const APPLICATION_NOT_FOUND: Self = Self(0xA0);
    /// Unrecoverable application error
    pub const APPLICATION_INTEGRITY_ERROR: Self = Self(0xA1);
    /// Authentication error or insufficient privilege
    pub const AUTHENTICATION_ERROR: Self = Self(0xAE);
    /// More frames follow
    pub const ADDITIONAL_FRAME: Self = Self(0xAF);
    /// Access beyond file or record limits
    pub const BOUNDARY_ERROR: Self = Self(0xBE);
    /// Unrecoverable PICC error
    pub const PICC_INTEGRITY_ERROR: Self = Self(0xC1);
    /// Previous command not completed
    pub const COMMAND_ABORTED: Self = Self(0xCA);
    /// PICC disabled
    pub const PICC_DISABLED: Self = Self(0xCD);
    /// Application count limit reached
    pub const COUNT_ERROR: Self = Self(0xCE);
    /// File or application already exists
    pub const DUPLICATE_ERROR: Self = Self(0xDE);
    /// NV write interrupted
    pub const EEPROM_ERROR: Self = Self(0xEE);
    /// File not found
    pub const FILE_NOT_FOUND: Self = Self(0xF0);
    /// Unrecoverable file error
    pub const FILE_INTEGRITY_ERROR: Self = Self(0xF1);

    /// Whether the command may continue (success or additional frame)
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::SUCCESS | Self::ADDITIONAL_FRAME)
    }

    /// Tracing level to report this status at
    pub const fn tracing_level(self) -> Level {
        if self.is_ok() {
            Level::TRACE
        } else {
            Level::WARN
        }
    }

    /// Get a description of this status
    pub const fn description(self) -> &'static str {
        match self.0 {
            0x00 => "Successful operation.",
            0xAF => "Additional data frame is expected to be sent.",
            0x0C => "No changes have been made, authenticate state revoked.",
            0x0E => "Insufficient NV-Memory to complete command.",
            0x1C => "Command code not supported.",
            0x1E => "CRC or MAC does not match data. Padding bytes not valid.",
            0x40 => "Invalid key number specified.",
            0x7E => "Length of command string invalid.",
            0x9D => "Current configuration / status does not allow the requested command.",
            0x9E => "Value of the parameter(s) invalid.",
            0xA0 => "Requested AID not present on PICC.",
            0xA1 => "Unrecoverable error within application, application will be disabled.",
            0xAE => "Authentication error or insufficient privilege.",
            0xBE => "Attempt to read/write data from/to beyond the file's/record's limits.",
            0xC1 => "Unrecoverable error within PICC, PICC will be disabled.",
            0xCA => {
                "Previous Command was not fully completed. Not all Frames were requested or provided by the PCD."
            }
            0xCD => "PICC was disabled by an unrecoverable error.",
            0xCE => "Number of Applications limited to 28, no additional CreateApplication possible.",
            0xDE => {
                "Creation of file/application failed because file/application with same number already exists."
            }
            0xEE => {
                "Could not complete NV-write operation due to loss of power, internal backup/rollback mechanism activated."
            }
            0xF0 => "Specified file number does not exist.",
            0xF1 => "Unrecoverable error within file, file will be disabled.",
            _ => "Unknown Error Code.",
        }
    }
}

impl From<u8> for Status {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        status.0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} - {}", self.0, self.description())
    }
}
