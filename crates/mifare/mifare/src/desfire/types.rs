//! Value types carried by DESFire commands

use std::{fmt, ops::Range};

use bytes::BufMut;
use nexum_picc_core::codec::{decode_sint, decode_uint, encode_sint, encode_uint};

use super::constants::{
    CREATE_BACKUP_DATA_FILE, CREATE_CYCLIC_RECORD_FILE, CREATE_LINEAR_RECORD_FILE,
    CREATE_STD_DATA_FILE, CREATE_VALUE_FILE,
};
use crate::{CipherSuite, Error, Result};

/// 24-bit application identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AppId(u32);

impl AppId {
    /// The PICC level, application 0
    pub const PICC: Self = Self(0);

    /// Create an application identifier, rejecting values above 24 bits
    pub const fn new(id: u32) -> Result<Self> {
        if id >= 1 << 24 {
            return Err(Error::InvalidArgument("application ID overflow"));
        }
        Ok(Self(id))
    }

    /// Numeric value
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Little-endian wire encoding
    pub const fn to_bytes(self) -> [u8; 3] {
        let [b0, b1, b2, _] = self.0.to_le_bytes();
        [b0, b1, b2]
    }

    /// Decode from the 3-byte wire encoding
    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
    }
}

impl TryFrom<u32> for AppId {
    type Error = Error;

    fn try_from(id: u32) -> Result<Self> {
        Self::new(id)
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.0)
    }
}

/// Master key settings of the PICC or an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySettings {
    /// Key number required for `change_key` (0x0E: the key itself, 0x0F: frozen)
    pub privileged_key: u8,
    /// Master key can be changed
    pub master_key_changeable: bool,
    /// Listing does not need the master key
    pub listing_without_master_key: bool,
    /// Creating and deleting does not need the master key
    pub create_delete_without_master_key: bool,
    /// These settings can be changed
    pub configuration_changeable: bool,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self::from(0x0F)
    }
}

impl From<u8> for KeySettings {
    fn from(byte: u8) -> Self {
        Self {
            privileged_key: byte >> 4,
            master_key_changeable: byte & 0x01 != 0,
            listing_without_master_key: byte & 0x02 != 0,
            create_delete_without_master_key: byte & 0x04 != 0,
            configuration_changeable: byte & 0x08 != 0,
        }
    }
}

impl From<KeySettings> for u8 {
    fn from(settings: KeySettings) -> Self {
        (settings.privileged_key << 4)
            | u8::from(settings.master_key_changeable)
            | (u8::from(settings.listing_without_master_key) << 1)
            | (u8::from(settings.create_delete_without_master_key) << 2)
            | (u8::from(settings.configuration_changeable) << 3)
    }
}

/// Key cipher of an application, as encoded in the key count byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppKeyType {
    /// DES or 2K3DES
    Des,
    /// 3K3DES
    Tdes3k,
    /// AES-128
    Aes,
}

impl AppKeyType {
    /// Upper bits OR'ed into the key count or key number
    pub const fn bits(self) -> u8 {
        match self {
            Self::Des => 0x00,
            Self::Tdes3k => 0x40,
            Self::Aes => 0x80,
        }
    }

    /// Decode from the upper bits of a key count byte
    pub const fn from_bits(byte: u8) -> Result<Self> {
        match byte & 0xC0 {
            0x00 => Ok(Self::Des),
            0x40 => Ok(Self::Tdes3k),
            0x80 => Ok(Self::Aes),
            _ => Err(Error::UnexpectedData("unknown key type bits")),
        }
    }
}

impl From<CipherSuite> for AppKeyType {
    fn from(suite: CipherSuite) -> Self {
        match suite {
            CipherSuite::Des | CipherSuite::TdesEde2 => Self::Des,
            CipherSuite::TdesEde3 => Self::Tdes3k,
            CipherSuite::Aes128 => Self::Aes,
        }
    }
}

/// Answer to GetKeySettings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySettingInfo {
    /// Master key settings
    pub settings: KeySettings,
    /// Number of keys in the application
    pub key_count: u8,
    /// Cipher of the application keys
    pub key_type: AppKeyType,
}

/// Communication mode of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileCommMode {
    /// Plain data
    #[default]
    Plain,
    /// Plain data secured by a MAC
    Mac,
    /// Encrypted data
    Encrypt,
}

impl FileCommMode {
    /// Wire encoding
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Plain => 0x00,
            Self::Mac => 0x01,
            Self::Encrypt => 0x03,
        }
    }

    /// Decode the communication settings byte
    pub const fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 | 0x02 => Ok(Self::Plain),
            0x01 => Ok(Self::Mac),
            0x03 => Ok(Self::Encrypt),
            _ => Err(Error::UnexpectedData("unknown communication mode")),
        }
    }
}

/// Access rights of a file, each a key number, [`FREE`](Self::FREE) or [`DENY`](Self::DENY)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilePermissions {
    /// Read access
    pub read: u8,
    /// Write access
    pub write: u8,
    /// Read and write access
    pub read_write: u8,
    /// Access to change these settings
    pub change: u8,
}

impl FilePermissions {
    /// Access without authentication
    pub const FREE: u8 = 0x0E;
    /// Access always denied
    pub const DENY: u8 = 0x0F;

    /// Create permissions from four access nibbles
    pub const fn new(read: u8, write: u8, read_write: u8, change: u8) -> Self {
        Self {
            read,
            write,
            read_write,
            change,
        }
    }
}

impl Default for FilePermissions {
    fn default() -> Self {
        Self::new(Self::FREE, Self::FREE, Self::FREE, Self::FREE)
    }
}

impl From<u16> for FilePermissions {
    fn from(value: u16) -> Self {
        Self {
            read: ((value >> 12) & 0x0F) as u8,
            write: ((value >> 8) & 0x0F) as u8,
            read_write: ((value >> 4) & 0x0F) as u8,
            change: (value & 0x0F) as u8,
        }
    }
}

impl From<FilePermissions> for u16 {
    fn from(p: FilePermissions) -> Self {
        (Self::from(p.read & 0x0F) << 12)
            | (Self::from(p.write & 0x0F) << 8)
            | (Self::from(p.read_write & 0x0F) << 4)
            | Self::from(p.change & 0x0F)
    }
}

/// File type with its type-specific settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Standard data file
    StdData {
        /// Size in bytes
        size: u32,
    },
    /// Data file with backup mechanism
    BackupData {
        /// Size in bytes
        size: u32,
    },
    /// 32-bit signed value file
    Value {
        /// Lower limit
        lower_limit: i32,
        /// Upper limit
        upper_limit: i32,
        /// Limited credit value
        limited_credit_value: i32,
        /// Limited credit enabled
        limited_credit_enabled: bool,
    },
    /// Record file refusing writes once full
    LinearRecord {
        /// Record size in bytes
        record_size: u32,
        /// Maximum number of records
        max_records: u32,
        /// Current number of records; ignored on creation
        current_records: u32,
    },
    /// Record file overwriting the oldest record once full
    CyclicRecord {
        /// Record size in bytes
        record_size: u32,
        /// Maximum number of records
        max_records: u32,
        /// Current number of records; ignored on creation
        current_records: u32,
    },
}

impl FileKind {
    /// File type byte
    pub const fn type_byte(&self) -> u8 {
        match self {
            Self::StdData { .. } => 0x00,
            Self::BackupData { .. } => 0x01,
            Self::Value { .. } => 0x02,
            Self::LinearRecord { .. } => 0x03,
            Self::CyclicRecord { .. } => 0x04,
        }
    }

    /// Command creating a file of this kind
    pub const fn create_command(&self) -> u8 {
        match self {
            Self::StdData { .. } => CREATE_STD_DATA_FILE,
            Self::BackupData { .. } => CREATE_BACKUP_DATA_FILE,
            Self::Value { .. } => CREATE_VALUE_FILE,
            Self::LinearRecord { .. } => CREATE_LINEAR_RECORD_FILE,
            Self::CyclicRecord { .. } => CREATE_CYCLIC_RECORD_FILE,
        }
    }

    /// Record size of record files
    pub const fn record_size(&self) -> Option<u32> {
        match self {
            Self::LinearRecord { record_size, .. } | Self::CyclicRecord { record_size, .. } => {
                Some(*record_size)
            }
            _ => None,
        }
    }
}

/// Settings of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSettings {
    /// Communication mode
    pub comm_mode: FileCommMode,
    /// Access rights
    pub permissions: FilePermissions,
    /// Type and type-specific settings
    pub kind: FileKind,
}

impl FileSettings {
    /// Create file settings
    pub const fn new(comm_mode: FileCommMode, permissions: FilePermissions, kind: FileKind) -> Self {
        Self {
            comm_mode,
            permissions,
            kind,
        }
    }

    /// Parse a GetFileSettings answer
    pub fn parse(data: &[u8]) -> Result<Self> {
        let field = |range: Range<usize>| {
            data.get(range)
                .ok_or(Error::UnexpectedData("file settings too short"))
        };
        let uint = |range: Range<usize>| -> Result<u32> { Ok(decode_uint(field(range)?)? as u32) };
        let sint = |range: Range<usize>| -> Result<i32> { Ok(decode_sint(field(range)?)? as i32) };

        let file_type = field(0..1)?[0];
        let comm_mode = FileCommMode::from_byte(field(1..2)?[0])?;
        let permissions = FilePermissions::from(decode_uint(field(2..4)?)? as u16);

        let kind = match file_type {
            0x00 => FileKind::StdData { size: uint(4..7)? },
            0x01 => FileKind::BackupData { size: uint(4..7)? },
            0x02 => FileKind::Value {
                lower_limit: sint(4..8)?,
                upper_limit: sint(8..12)?,
                limited_credit_value: sint(12..16)?,
                limited_credit_enabled: field(16..17)?[0] & 0x01 != 0,
            },
            0x03 => FileKind::LinearRecord {
                record_size: uint(4..7)?,
                max_records: uint(7..10)?,
                current_records: uint(10..13)?,
            },
            0x04 => FileKind::CyclicRecord {
                record_size: uint(4..7)?,
                max_records: uint(7..10)?,
                current_records: uint(10..13)?,
            },
            _ => return Err(Error::UnexpectedData("unknown file type")),
        };

        Ok(Self {
            comm_mode,
            permissions,
            kind,
        })
    }

    /// Encode the CreateFile payload for file `id`
    pub fn encode_create(&self, id: u8) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(18);
        buf.put_u8(id);
        self.encode_access(&mut buf);

        match self.kind {
            FileKind::StdData { size } | FileKind::BackupData { size } => {
                encode_uint(&mut buf, size.into(), 3)?;
            }
            FileKind::Value {
                lower_limit,
                upper_limit,
                limited_credit_value,
                limited_credit_enabled,
            } => {
                encode_sint(&mut buf, lower_limit.into(), 4)?;
                encode_sint(&mut buf, upper_limit.into(), 4)?;
                encode_sint(&mut buf, limited_credit_value.into(), 4)?;
                buf.put_u8(u8::from(limited_credit_enabled));
            }
            FileKind::LinearRecord {
                record_size,
                max_records,
                ..
            }
            | FileKind::CyclicRecord {
                record_size,
                max_records,
                ..
            } => {
                encode_uint(&mut buf, record_size.into(), 3)?;
                encode_uint(&mut buf, max_records.into(), 3)?;
            }
        }

        Ok(buf)
    }

    /// Append the communication mode and access rights
    pub fn encode_access<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.comm_mode.to_byte());
        buf.put_u16_le(self.permissions.into());
    }
}

/// Hardware or software part of a card version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    /// Vendor ID (0x04 for NXP)
    pub vendor: u8,
    /// Type
    pub kind: u8,
    /// Subtype
    pub subtype: u8,
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
    /// Storage size in bytes
    pub storage_size: u32,
    /// Communication protocol type
    pub protocol: u8,
}

impl VersionInfo {
    fn parse(data: &[u8]) -> Result<Self> {
        let storage_size = 1u32
            .checked_shl(u32::from(data[5] / 2))
            .ok_or(Error::UnexpectedData("storage size out of range"))?;
        Ok(Self {
            vendor: data[0],
            kind: data[1],
            subtype: data[2],
            major: data[3],
            minor: data[4],
            storage_size,
            protocol: data[6],
        })
    }
}

/// Answer to GetVersion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardVersion {
    /// Hardware information
    pub hardware: VersionInfo,
    /// Software information
    pub software: VersionInfo,
    /// Card UID
    pub uid: [u8; 7],
    /// Production batch number
    pub batch_number: [u8; 5],
    /// Production calendar week
    pub production_week: u8,
    /// Production year
    pub production_year: u16,
}

impl CardVersion {
    /// Length of the three GetVersion frames combined
    pub const LENGTH: usize = 28;

    /// Parse the concatenated GetVersion frames
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::LENGTH {
            return Err(Error::UnexpectedData("card version too short"));
        }

        let mut uid = [0u8; 7];
        uid.copy_from_slice(&data[14..21]);
        let mut batch_number = [0u8; 5];
        batch_number.copy_from_slice(&data[21..26]);

        Ok(Self {
            hardware: VersionInfo::parse(&data[0..7])?,
            software: VersionInfo::parse(&data[7..14])?,
            uid,
            batch_number,
            production_week: from_bcd(data[26]),
            production_year: 2000 + u16::from(from_bcd(data[27])),
        })
    }
}

impl fmt::Display for CardVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Card Version:")?;
        writeln!(
            f,
            "  Hardware: vendor {:#04x}, type {:#04x}.{:#04x}, v{}.{}, {} bytes",
            self.hardware.vendor,
            self.hardware.kind,
            self.hardware.subtype,
            self.hardware.major,
            self.hardware.minor,
            self.hardware.storage_size
        )?;
        writeln!(
            f,
            "  Software: vendor {:#04x}, type {:#04x}.{:#04x}, v{}.{}, {} bytes",
            self.software.vendor,
            self.software.kind,
            self.software.subtype,
            self.software.major,
            self.software.minor,
            self.software.storage_size
        )?;
        writeln!(f, "  UID: {}", hex::encode(self.uid))?;
        writeln!(f, "  Batch: {}", hex::encode(self.batch_number))?;
        write!(
            f,
            "  Produced: week {} of {}",
            self.production_week, self.production_year
        )
    }
}

const fn from_bcd(byte: u8) -> u8 {
    (byte >> 4) * 10 + (byte & 0x0F)
}
