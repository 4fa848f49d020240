//! Core traits and types for ISO/IEC 14443-A PICC communication
//!
//! This crate provides the foundation shared by every card family in the
//! workspace: the contract a PCD (reader chip) driver has to fulfil, and the
//! type A commands that run on top of it.
//!
//! ## Overview
//!
//! - [`PcdTransceiver`] is implemented by reader drivers. It exchanges raw bit
//!   frames, exposes the CRC_A coprocessor, the chip timer, baud rate settings
//!   and the chip-assisted Crypto1 unit.
//! - [`PiccCommands`] is implemented for every transceiver and provides
//!   REQA/WUPA, the cascaded anti-collision loop, HLTA and re-activation.
//! - [`codec`] contains the little-endian integer helpers used by the card
//!   command layers.
//!
//! Everything is synchronous. A card handle owns (or mutably borrows) the
//! transceiver for the lifetime of its session.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod anticollision;
pub mod codec;
pub mod config;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod picc;
pub mod transceiver;

mod error;
pub use error::{Error, Result, ResultExt};

pub use anticollision::{PiccCommands, RequestCommand};
pub use config::ProtocolConfig;
pub use picc::{Picc, PiccType, Sak, Uid};
pub use transceiver::{BaudRate, CollisionPosition, Direction, PcdTransceiver, Reception};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, BytesMut, Error, Picc, PiccCommands, ProtocolConfig, Result, ResultExt, Sak, Uid,
        transceiver::{CollisionPosition, Direction, PcdTransceiver, Reception},
    };
}
