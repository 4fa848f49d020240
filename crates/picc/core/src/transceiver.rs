//! Contract between the protocol layers and a PCD (reader chip) driver
//!
//! A driver only has to move bits over the air and expose a few chip
//! facilities. Framing, CRC handling and ACK/NAK interpretation for standard
//! frames are provided on top of that by [`PcdTransceiver::picc_transceive`].

use std::fmt;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::{Error, Result};

/// 4-bit MIFARE acknowledge
pub const MIFARE_ACK: u8 = 0x0A;

/// Direction of a baud rate setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// PCD to PICC
    Transmit,
    /// PICC to PCD
    Receive,
}

/// Air interface bit rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum BaudRate {
    /// 106 kbit/s, the rate every card starts at
    #[default]
    Kbps106,
    /// 212 kbit/s
    Kbps212,
    /// 424 kbit/s
    Kbps424,
    /// 848 kbit/s
    Kbps848,
}

impl BaudRate {
    /// Bit rate divisor exponent as carried in PPS (DRI/DSI)
    pub const fn divisor(self) -> u8 {
        self as u8
    }

    /// Highest rate whose bit is set in an ATS TA(1) capability nibble
    pub const fn highest_supported(capabilities: u8) -> Self {
        if capabilities & 0x04 != 0 {
            Self::Kbps848
        } else if capabilities & 0x02 != 0 {
            Self::Kbps424
        } else if capabilities & 0x01 != 0 {
            Self::Kbps212
        } else {
            Self::Kbps106
        }
    }
}

/// Where a bit collision was detected in the received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPosition {
    /// 1-based position of the first colliding bit, counted from the first
    /// UID bit of the current cascade level
    Bit(u8),
    /// The chip saw a collision but could not locate it
    Unknown,
}

/// Raw result of one exchange
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reception {
    /// Received bytes
    pub data: Bytes,
    /// Valid bits in the last received byte, 0 meaning the whole byte
    pub valid_bits: u8,
    /// Set when the chip detected a collision during reception
    pub collision: Option<CollisionPosition>,
}

impl Reception {
    /// A complete reception of whole bytes without collision
    pub fn complete(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            valid_bits: 0,
            collision: None,
        }
    }

    /// A 4-bit ACK/NAK reception
    pub fn nibble(value: u8) -> Self {
        Self {
            data: Bytes::copy_from_slice(&[value & 0x0F]),
            valid_bits: 4,
            collision: None,
        }
    }
}

/// Trait implemented by reader chip drivers
///
/// Required methods talk to the hardware. Timeouts are reported as
/// [`Error::PiccTimeout`] (card silent) or [`Error::PcdTimeout`] (chip stuck).
pub trait PcdTransceiver: fmt::Debug {
    /// Send `frame` and return what the card answered
    ///
    /// Only `tx_last_bits` bits of the last byte are sent (0 meaning all 8),
    /// and the first received bit is stored at the same bit position.
    fn transceive_bits(&mut self, frame: &[u8], tx_last_bits: u8) -> Result<Reception> {
        trace!(frame = %hex::encode(frame), tx_last_bits, "Transmitting frame");
        let result = self.do_transceive_bits(frame, tx_last_bits);
        match &result {
            Ok(reception) => {
                trace!(
                    data = %hex::encode(&reception.data),
                    valid_bits = reception.valid_bits,
                    collision = ?reception.collision,
                    "Received frame"
                );
            }
            Err(e) => {
                debug!(error = %e, "Exchange failed");
            }
        }
        result
    }

    /// Internal implementation of transceive_bits
    /// This is the method that concrete drivers should override
    fn do_transceive_bits(&mut self, frame: &[u8], tx_last_bits: u8) -> Result<Reception>;

    /// CRC_A of `data` as computed by the chip coprocessor
    fn calculate_crc(&mut self, data: &[u8]) -> Result<[u8; 2]>;

    /// Current receive timeout in timer ticks
    fn internal_timer(&self) -> u32;

    /// Set the receive timeout in timer ticks
    fn set_internal_timer(&mut self, ticks: u32) -> Result<()>;

    /// Current air interface bit rate for one direction
    fn baud_rate(&self, direction: Direction) -> BaudRate;

    /// Set the air interface bit rate for one direction
    fn set_baud_rate(&mut self, direction: Direction, rate: BaudRate) -> Result<()>;

    /// Run the chip Crypto1 authentication; `false` when the card rejected the key
    fn mifare_crypto1_authenticate(
        &mut self,
        command: u8,
        block: u8,
        key: &[u8; 6],
        uid: &[u8; 4],
    ) -> Result<bool>;

    /// Stop the chip Crypto1 unit
    fn mifare_crypto1_deauthenticate(&mut self) -> Result<()>;

    /// Exchange a standard frame with CRC_A
    ///
    /// The CRC is appended to `frame`, and checked and stripped from the
    /// answer. A 4-bit ACK yields an empty frame, a NAK is
    /// [`Error::MifareNak`]. With `accept_timeout` a silent card yields an
    /// empty frame as well.
    fn picc_transceive(&mut self, frame: &[u8], accept_timeout: bool) -> Result<Bytes> {
        let mut buffer = BytesMut::with_capacity(frame.len() + 2);
        buffer.extend_from_slice(frame);
        let crc = self.calculate_crc(frame)?;
        buffer.extend_from_slice(&crc);

        let reception = match self.transceive_bits(&buffer, 0) {
            Ok(reception) => reception,
            Err(Error::PiccTimeout) if accept_timeout => return Ok(Bytes::new()),
            Err(e) => return Err(e),
        };

        if reception.collision.is_some() {
            return Err(Error::Collision);
        }

        let data = reception.data;

        // MIFARE ACK/NAK
        if data.len() == 1 && reception.valid_bits == 4 {
            let nibble = data[0] & 0x0F;
            if nibble != MIFARE_ACK {
                return Err(Error::MifareNak(nibble));
            }
            return Ok(Bytes::new());
        }

        if data.len() < 3 || reception.valid_bits != 0 {
            return Err(Error::unexpected("frame too short for CRC_A"));
        }

        let payload_len = data.len() - 2;
        if self.calculate_crc(&data[..payload_len])? != data[payload_len..] {
            return Err(Error::IncorrectCrc);
        }

        Ok(data.slice(..payload_len))
    }
}

impl<T: PcdTransceiver + ?Sized> PcdTransceiver for &mut T {
    fn do_transceive_bits(&mut self, frame: &[u8], tx_last_bits: u8) -> Result<Reception> {
        (**self).do_transceive_bits(frame, tx_last_bits)
    }

    fn calculate_crc(&mut self, data: &[u8]) -> Result<[u8; 2]> {
        (**self).calculate_crc(data)
    }

    fn internal_timer(&self) -> u32 {
        (**self).internal_timer()
    }

    fn set_internal_timer(&mut self, ticks: u32) -> Result<()> {
        (**self).set_internal_timer(ticks)
    }

    fn baud_rate(&self, direction: Direction) -> BaudRate {
        (**self).baud_rate(direction)
    }

    fn set_baud_rate(&mut self, direction: Direction, rate: BaudRate) -> Result<()> {
        (**self).set_baud_rate(direction, rate)
    }

    fn mifare_crypto1_authenticate(
        &mut self,
        command: u8,
        block: u8,
        key: &[u8; 6],
        uid: &[u8; 4],
    ) -> Result<bool> {
        (**self).mifare_crypto1_authenticate(command, block, key, uid)
    }

    fn mifare_crypto1_deauthenticate(&mut self) -> Result<()> {
        (**self).mifare_crypto1_deauthenticate()
    }
}
