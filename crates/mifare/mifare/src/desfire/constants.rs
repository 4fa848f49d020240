//! DESFire native command codes

// Security
/// Authenticate with a DES, 2K3DES or 3K3DES key
pub const AUTHENTICATE_DES: u8 = 0x1A;
/// Authenticate with an AES key
pub const AUTHENTICATE_AES: u8 = 0xAA;
/// Read the master key settings and key count
pub const GET_KEY_SETTINGS: u8 = 0x45;
/// Change the master key settings
pub const CHANGE_KEY_SETTINGS: u8 = 0x54;
/// Read the version of a key
pub const GET_KEY_VERSION: u8 = 0x64;
/// Change a key
pub const CHANGE_KEY: u8 = 0xC4;

// PICC level
/// Create an application
pub const CREATE_APPLICATION: u8 = 0xCA;
/// Delete an application
pub const DELETE_APPLICATION: u8 = 0xDA;
/// List application identifiers
pub const GET_APPLICATION_IDS: u8 = 0x6A;
/// Select an application
pub const SELECT_APPLICATION: u8 = 0x5A;
/// Read manufacturing data
pub const GET_VERSION: u8 = 0x60;
/// Release all user memory
pub const FORMAT_PICC: u8 = 0xFC;

// Application level
/// List file identifiers
pub const GET_FILE_IDS: u8 = 0x6F;
/// Read the settings of a file
pub const GET_FILE_SETTINGS: u8 = 0xF5;
/// Change the access settings of a file
pub const CHANGE_FILE_SETTINGS: u8 = 0x5F;
/// Create a standard data file
pub const CREATE_STD_DATA_FILE: u8 = 0xCD;
/// Create a backup data file
pub const CREATE_BACKUP_DATA_FILE: u8 = 0xCB;
/// Create a value file
pub const CREATE_VALUE_FILE: u8 = 0xCC;
/// Create a linear record file
pub const CREATE_LINEAR_RECORD_FILE: u8 = 0xC1;
/// Create a cyclic record file
pub const CREATE_CYCLIC_RECORD_FILE: u8 = 0xC0;
/// Delete a file
pub const DELETE_FILE: u8 = 0xDF;

// Data manipulation
/// Read from a data file
pub const READ_DATA: u8 = 0xBD;
/// Write to a data file
pub const WRITE_DATA: u8 = 0x3D;
/// Read a value file
pub const GET_VALUE: u8 = 0x6C;
/// Increase a value
pub const CREDIT: u8 = 0x0C;
/// Decrease a value
pub const DEBIT: u8 = 0xDC;
/// Limited increase of a value
pub const LIMITED_CREDIT: u8 = 0x1C;
/// Write a record
pub const WRITE_RECORD: u8 = 0x3B;
/// Read records
pub const READ_RECORDS: u8 = 0xBB;
/// Empty a record file
pub const CLEAR_RECORD_FILE: u8 = 0xEB;
/// Commit pending writes
pub const COMMIT_TRANSACTION: u8 = 0xC7;
/// Discard pending writes
pub const ABORT_TRANSACTION: u8 = 0xA7;

/// Continuation frame, both as command and as status
pub const ADDITIONAL_FRAME: u8 = 0xAF;

/// Highest key number an application can hold
pub const MAX_KEY_NUMBER: u8 = 13;
/// Keys per application
pub const MAX_KEY_COUNT: u8 = 14;
