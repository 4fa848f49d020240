//! MIFARE Classic (Mini, 1K, 4K)
//!
//! Sector access is authenticated by the reader chip's Crypto1 unit. Once a
//! sector is authenticated, blocks are read and written in 16 byte units and
//! value blocks support increment, decrement and restore through the card's
//! transfer buffer.

use nexum_picc_core::{
    Error as PiccError, PcdTransceiver, Picc, PiccCommands, ProtocolConfig,
    codec::{decode_sint, encode_uint},
};
use tracing::debug;

use crate::{Error, Result};

/// Authenticate with key A
pub const AUTH_KEY_A: u8 = 0x60;
/// Authenticate with key B
pub const AUTH_KEY_B: u8 = 0x61;
/// Read one 16 byte block
pub const READ: u8 = 0x30;
/// Write one 16 byte block
pub const WRITE: u8 = 0xA0;
/// Subtract from a value block into the transfer buffer
pub const DECREMENT: u8 = 0xC0;
/// Add to a value block into the transfer buffer
pub const INCREMENT: u8 = 0xC1;
/// Copy a value block into the transfer buffer
pub const RESTORE: u8 = 0xC2;
/// Write the transfer buffer to a block
pub const TRANSFER: u8 = 0xB0;

/// Size of a block
pub const BLOCK_SIZE: usize = 16;

/// Sector key used for Crypto1 authentication
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ClassicKey {
    /// Key A
    A([u8; 6]),
    /// Key B
    B([u8; 6]),
}

impl ClassicKey {
    /// Factory default key A
    pub const DEFAULT: Self = Self::A([0xFF; 6]);

    const fn command(&self) -> u8 {
        match self {
            Self::A(_) => AUTH_KEY_A,
            Self::B(_) => AUTH_KEY_B,
        }
    }

    const fn bytes(&self) -> &[u8; 6] {
        match self {
            Self::A(key) | Self::B(key) => key,
        }
    }
}

impl std::fmt::Debug for ClassicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A(_) => f.write_str("ClassicKey::A(..)"),
            Self::B(_) => f.write_str("ClassicKey::B(..)"),
        }
    }
}

/// A value block: a signed 32-bit value stored three times and a backup
/// block address stored four times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueBlock {
    /// Value
    pub value: i32,
    /// Address byte, by convention the block's own address
    pub address: u8,
}

impl ValueBlock {
    /// Create a value block
    pub const fn new(value: i32, address: u8) -> Self {
        Self { value, address }
    }

    /// Encode as value ‖ !value ‖ value ‖ addr ‖ !addr ‖ addr ‖ !addr
    pub fn encode(&self) -> [u8; BLOCK_SIZE] {
        let value = self.value.to_le_bytes();
        let inverted = (!self.value).to_le_bytes();

        let mut block = [0u8; BLOCK_SIZE];
        block[0..4].copy_from_slice(&value);
        block[4..8].copy_from_slice(&inverted);
        block[8..12].copy_from_slice(&value);
        block[12] = self.address;
        block[13] = !self.address;
        block[14] = self.address;
        block[15] = !self.address;
        block
    }

    /// Decode a block, checking the redundant copies
    pub fn decode(block: &[u8; BLOCK_SIZE]) -> Result<Self> {
        let copy = |range: std::ops::Range<usize>| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&block[range]);
            i32::from_le_bytes(bytes)
        };
        let value = copy(0..4);

        if copy(4..8) != !value || copy(8..12) != value {
            return Err(Error::UnexpectedData("value copies do not match"));
        }
        if block[13] != !block[12] || block[14] != block[12] || block[15] != block[13] {
            return Err(Error::UnexpectedData("address copies do not match"));
        }

        Ok(Self::new(value, block[12]))
    }
}

/// A MIFARE Classic card
#[derive(Debug)]
pub struct Classic<T: PcdTransceiver> {
    pcd: T,
    picc: Picc,
    config: ProtocolConfig,
}

impl<T: PcdTransceiver> Classic<T> {
    /// Wrap a card that completed type A selection
    pub const fn new(pcd: T, picc: Picc, config: ProtocolConfig) -> Self {
        Self { pcd, picc, config }
    }

    /// Identity of the card
    pub const fn picc(&self) -> &Picc {
        &self.picc
    }

    /// Access the transceiver
    pub const fn pcd_mut(&mut self) -> &mut T {
        &mut self.pcd
    }

    /// Release the transceiver
    pub fn into_inner(self) -> T {
        self.pcd
    }

    /// Authenticate the sector holding `block`
    pub fn auth(&mut self, block: u8, key: &ClassicKey) -> Result<()> {
        let uid = self.picc.uid.crypto1_uid();
        if self
            .pcd
            .mifare_crypto1_authenticate(key.command(), block, key.bytes(), &uid)?
        {
            debug!(block, ?key, "Sector authenticated");
            Ok(())
        } else {
            debug!(block, ?key, "Sector authentication rejected");
            Err(PiccError::AuthenticationFailed.into())
        }
    }

    /// Stop Crypto1 encryption
    pub fn deauth(&mut self) -> Result<()> {
        Ok(self.pcd.mifare_crypto1_deauthenticate()?)
    }

    /// Read a block
    pub fn read(&mut self, block: u8) -> Result<[u8; BLOCK_SIZE]> {
        let data = self.pcd.picc_transceive(&[READ, block], false)?;
        data[..]
            .try_into()
            .map_err(|_| Error::UnexpectedData("block is not 16 bytes"))
    }

    /// Write a block
    pub fn write(&mut self, block: u8, data: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.send_acked(&[WRITE, block], false)?;
        self.send_acked(data, false)
    }

    /// Read the value of a value block
    ///
    /// Only the first copy is decoded; use [`ValueBlock::decode`] on
    /// [`read`](Self::read) to check the block's integrity.
    pub fn read_value(&mut self, block: u8) -> Result<i32> {
        let data = self.read(block)?;
        Ok(decode_sint(&data[..4])? as i32)
    }

    /// Format `block` as a value block holding `value`
    pub fn write_value(&mut self, block: u8, value: i32) -> Result<()> {
        self.write(block, &ValueBlock::new(value, block).encode())
    }

    /// Add `delta` to a value block into the transfer buffer
    pub fn increment(&mut self, block: u8, delta: u32) -> Result<()> {
        self.two_step(INCREMENT, block, delta)
    }

    /// Subtract `delta` from a value block into the transfer buffer
    pub fn decrement(&mut self, block: u8, delta: u32) -> Result<()> {
        self.two_step(DECREMENT, block, delta)
    }

    /// Load a value block into the transfer buffer
    pub fn restore(&mut self, block: u8) -> Result<()> {
        self.two_step(RESTORE, block, 0)
    }

    /// Write the transfer buffer to `block`
    pub fn transfer(&mut self, block: u8) -> Result<()> {
        self.send_acked(&[TRANSFER, block], false)
    }

    /// Put the card into HALT state
    pub fn halt(&mut self) -> Result<()> {
        Ok(self.pcd.picc_halt()?)
    }

    /// Wake and select the card again after a failure or halt
    ///
    /// Returns `false` when a different card answered. Sectors have to be
    /// authenticated again.
    pub fn resume_communication(&mut self) -> Result<bool> {
        if let Err(e) = self.pcd.mifare_crypto1_deauthenticate() {
            debug!(error = %e, "Ignoring Crypto1 stop failure");
        }
        Ok(self
            .pcd
            .reestablish_picc_communication(&self.picc.uid, &self.config)?)
    }

    /// Command with block address, then a 4 byte operand the card does not
    /// acknowledge
    fn two_step(&mut self, command: u8, block: u8, operand: u32) -> Result<()> {
        self.send_acked(&[command, block], false)?;

        let mut data = Vec::with_capacity(4);
        encode_uint(&mut data, u64::from(operand), 4)?;
        self.send_acked(&data, true)
    }

    /// Send a frame answered by a bare ACK
    fn send_acked(&mut self, frame: &[u8], accept_timeout: bool) -> Result<()> {
        let answer = self.pcd.picc_transceive(frame, accept_timeout)?;
        if !answer.is_empty() {
            return Err(Error::UnexpectedData("expected ACK"));
        }
        Ok(())
    }
}
