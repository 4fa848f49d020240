//! ISO/IEC 14443-4 block transmission protocol
//!
//! [`Iso14443Card`] activates a type A card at layer 4 (RATS/ATS, PPS) and
//! exchanges application data in I-blocks, taking care of chaining, block
//! number toggling and waiting time extensions. Card command layers build on
//! the [`BlockTransport`] trait rather than on the card type directly.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod ats;
pub mod block;
mod card;
mod error;
mod transport;

pub use ats::Ats;
pub use card::Iso14443Card;
pub use error::{Error, Result};
pub use transport::BlockTransport;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{Ats, BlockTransport, Error, Iso14443Card, Result};
}
