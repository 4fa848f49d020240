//! MIFARE card command layers
//!
//! Command sets for the MIFARE families on top of the type A and ISO/IEC
//! 14443-4 layers of the workspace.
//!
//! ## Overview
//!
//! - [`classic`]: MIFARE Classic sector authentication through the reader's
//!   Crypto1 unit, block access and value block arithmetic.
//! - [`ultralight`]: MIFARE Ultralight page access, Ultralight-C detection and
//!   3DES authentication.
//! - [`desfire`]: the DESFire EV1 native command set with DES, 3DES and AES
//!   authentication and CMAC or encrypted secure messaging.
//! - [`Key`]: the block cipher and CMAC primitive the secure layers share.
//!
//! ## Example
//!
//! ```no_run
//! use nexum_mifare::{Key, KeyType, desfire::{AppId, DesFire}};
//! use nexum_picc_core::{PcdTransceiver, PiccCommands, ProtocolConfig};
//!
//! fn read_file<T: PcdTransceiver>(mut pcd: T) -> nexum_mifare::Result<Vec<u8>> {
//!     let config = ProtocolConfig::default();
//!     let picc = pcd.activate(&config)?;
//!     let mut card = DesFire::activate(pcd, picc, config)?;
//!
//!     card.select_app(AppId::new(0x00_30_00)?)?;
//!     let key = Key::new(KeyType::Aes, &[0u8; 16], 0)?;
//!     if !card.auth(0, &key)? {
//!         return Err(nexum_mifare::Error::Unauthenticated);
//!     }
//!     Ok(card.read_data(1, 0, 0)?.to_vec())
//! }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod classic;
pub mod desfire;
pub mod ultralight;

mod crc;
mod error;
mod key;

pub use crc::crc32;
pub use error::{Error, Result};
pub use key::{CipherSuite, Key, KeyType};

pub use classic::{Classic, ClassicKey, ValueBlock};
pub use desfire::DesFire;
pub use ultralight::{Ultralight, UltralightC, UltralightCard, UltralightKind};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        CipherSuite, Classic, ClassicKey, DesFire, Error, Key, KeyType, Result, Ultralight,
        UltralightC, UltralightCard,
        desfire::{AppId, FileCommMode, FileKind, FilePermissions, FileSettings, Status},
    };
}
