//! Identity of a selected card

use std::fmt;

use derive_more::{Deref, Display};

use crate::{Error, Result};

/// Cascade tag prefixing a UID that continues on the next cascade level
pub const CASCADE_TAG: u8 = 0x88;

/// SAK bit announcing another cascade level
pub const SAK_CASCADE_BIT: u8 = 0x04;

/// Card UID of 4, 7 or 10 bytes
#[derive(Clone, PartialEq, Eq, Hash, Deref)]
#[deref(forward)]
pub struct Uid(Vec<u8>);

impl Uid {
    /// Create a UID, rejecting lengths other than 4, 7 and 10
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        match bytes.len() {
            4 | 7 | 10 => Ok(Self(bytes)),
            _ => Err(Error::unexpected("UID must be 4, 7 or 10 bytes")),
        }
    }

    /// Last four bytes, as fed to Crypto1
    pub fn crypto1_uid(&self) -> [u8; 4] {
        let mut tail = [0u8; 4];
        tail.copy_from_slice(&self.0[self.0.len() - 4..]);
        tail
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", hex::encode(&self.0))
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// Card family as announced by SAK
///
/// See NXP AN10833, section 3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PiccType {
    /// SAK still announces another cascade level
    UidIncomplete,
    /// MIFARE Classic Mini
    MifareMini,
    /// MIFARE Classic 1K
    Mifare1k,
    /// MIFARE Classic 4K
    Mifare4k,
    /// MIFARE Ultralight or Ultralight C
    MifareUltralight,
    /// MIFARE Plus
    MifarePlus,
    /// ISO/IEC 14443-4 compliant, e.g. DESFire
    Iso14443_4,
    /// ISO/IEC 18092 (NFC-DEP)
    Iso18092,
    /// Anything else
    Unknown,
}

/// Select acknowledge byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{_0:#04x}")]
pub struct Sak(pub u8);

impl Sak {
    /// Whether the UID continues on the next cascade level
    pub const fn cascade(self) -> bool {
        self.0 & SAK_CASCADE_BIT != 0
    }

    /// Card family announced by this SAK
    pub const fn picc_type(self) -> PiccType {
        // Bit 8 is ignored; some vendors set it
        match self.0 & 0x7F {
            0x04 => PiccType::UidIncomplete,
            0x09 => PiccType::MifareMini,
            0x08 => PiccType::Mifare1k,
            0x18 => PiccType::Mifare4k,
            0x00 => PiccType::MifareUltralight,
            0x10 | 0x11 => PiccType::MifarePlus,
            0x20 => PiccType::Iso14443_4,
            0x40 => PiccType::Iso18092,
            _ => PiccType::Unknown,
        }
    }
}

/// A selected card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picc {
    /// Complete UID, cascade tags removed
    pub uid: Uid,
    /// SAK of the final cascade level
    pub sak: Sak,
}

impl Picc {
    /// Create a card identity
    pub const fn new(uid: Uid, sak: Sak) -> Self {
        Self { uid, sak }
    }

    /// Card family announced by SAK
    pub const fn picc_type(&self) -> PiccType {
        self.sak.picc_type()
    }
}
