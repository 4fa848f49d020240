//! MIFARE Ultralight and Ultralight-C
//!
//! Ultralight memory is organised in 4 byte pages. A read returns four
//! consecutive pages, a write stores one. Ultralight-C adds 2-key 3DES mutual
//! authentication, a 16-bit one-way counter and configurable page protection.

use derive_more::{Deref, DerefMut};
use nexum_picc_core::{Error as PiccError, PcdTransceiver, Picc, PiccCommands, ProtocolConfig};
use rand::{RngCore, rng};
use tracing::{debug, warn};

use crate::{CipherSuite, Error, Key, Result};

/// Read four pages
pub const READ: u8 = 0x30;
/// Write one page
pub const WRITE: u8 = 0xA2;
/// First step of 3DES authentication
pub const AUTHENTICATE: u8 = 0x1A;
/// Continuation of 3DES authentication
pub const AUTHENTICATE_CONTINUE: u8 = 0xAF;

/// Size of a page
pub const PAGE_SIZE: usize = 4;

/// Counter page of an Ultralight-C
pub const COUNTER_PAGE: u8 = 0x29;
/// AUTH0: first page that requires authentication
pub const AUTH0_PAGE: u8 = 0x2A;
/// AUTH1: access restriction for protected pages
pub const AUTH1_PAGE: u8 = 0x2B;
/// First of the four key pages
pub const KEY_PAGE: u8 = 0x2C;
/// AUTH0 value that disables protection
pub const PROTECTION_DISABLED: u8 = 0x30;

/// Capability found by [`Ultralight::probe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UltralightKind {
    /// No authentication support
    Standard,
    /// 3DES authentication (Ultralight-C)
    WithDes,
}

/// Access restriction for pages from AUTH0 on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionMode {
    /// Reading and writing need authentication
    ReadWrite,
    /// Only writing needs authentication
    WriteOnly,
}

impl ProtectionMode {
    const fn auth1(self) -> u8 {
        match self {
            Self::ReadWrite => 0x00,
            Self::WriteOnly => 0x01,
        }
    }
}

/// A MIFARE Ultralight card
#[derive(Debug)]
pub struct Ultralight<T: PcdTransceiver> {
    pcd: T,
    picc: Picc,
    config: ProtocolConfig,
}

impl<T: PcdTransceiver> Ultralight<T> {
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

    /// Read four pages starting at `page`
    pub fn read(&mut self, page: u8) -> Result<[u8; 16]> {
        let data = self.pcd.picc_transceive(&[READ, page], false)?;
        data[..]
            .try_into()
            .map_err(|_| Error::UnexpectedData("read did not return four pages"))
    }

    /// Write one page
    pub fn write(&mut self, page: u8, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut frame = [0u8; 2 + PAGE_SIZE];
        frame[0] = WRITE;
        frame[1] = page;
        frame[2..].copy_from_slice(data);
        self.pcd.picc_transceive(&frame, false)?;
        Ok(())
    }

    /// Put the card into HALT state
    pub fn halt(&mut self) -> Result<()> {
        Ok(self.pcd.picc_halt()?)
    }

    /// Wake and select the card again; `false` when a different card answered
    pub fn resume_communication(&mut self) -> Result<bool> {
        Ok(self
            .pcd
            .reestablish_picc_communication(&self.picc.uid, &self.config)?)
    }

    /// Find out whether the card supports 3DES authentication
    ///
    /// The probe leaves the card confused, so it is woken and selected again
    /// afterwards whatever the outcome.
    pub fn probe(&mut self) -> Result<UltralightKind> {
        let kind = match self.pcd.picc_transceive(&[AUTHENTICATE, 0x00], false) {
            Ok(data) if data.len() == 9 && data[0] == AUTHENTICATE_CONTINUE => {
                UltralightKind::WithDes
            }
            Ok(_) => UltralightKind::Standard,
            Err(e) => {
                debug!(error = %e, "Authentication probe rejected");
                UltralightKind::Standard
            }
        };

        if !self.resume_communication()? {
            return Err(Error::UnexpectedData("card did not return after probe"));
        }

        debug!(uid = %self.picc.uid, ?kind, "Ultralight probed");
        Ok(kind)
    }

    /// Probe the card and wrap it in the matching handle
    pub fn detect(mut self) -> Result<UltralightCard<T>> {
        Ok(match self.probe()? {
            UltralightKind::Standard => UltralightCard::Standard(self),
            UltralightKind::WithDes => UltralightCard::C(UltralightC(self)),
        })
    }
}

/// Result of [`Ultralight::detect`]
#[derive(Debug)]
pub enum UltralightCard<T: PcdTransceiver> {
    /// Ultralight or another card without authentication
    Standard(Ultralight<T>),
    /// Ultralight-C
    C(UltralightC<T>),
}

/// A MIFARE Ultralight-C card
#[derive(Debug, Deref, DerefMut)]
pub struct UltralightC<T: PcdTransceiver>(Ultralight<T>);

impl<T: PcdTransceiver> UltralightC<T> {
    /// Wrap a card known to be an Ultralight-C
    pub const fn new(card: Ultralight<T>) -> Self {
        Self(card)
    }

    /// Release the plain Ultralight handle
    pub fn into_inner(self) -> Ultralight<T> {
        self.0
    }

    /// 3DES mutual authentication
    ///
    /// Returns `false` and halts the card when the card's proof does not
    /// match.
    pub fn auth(&mut self, key: &Key) -> Result<bool> {
        if !matches!(key.cipher_suite(), CipherSuite::Des | CipherSuite::TdesEde2) {
            return Err(Error::InvalidKey("Ultralight-C needs a 2-key 3DES key"));
        }
        let mut key = key.clone();
        key.clear_iv();

        let challenge = self.pcd.picc_transceive(&[AUTHENTICATE, 0x00], false)?;
        let [AUTHENTICATE_CONTINUE, encrypted_rnd_b @ ..] = &challenge[..] else {
            return Err(Error::UnexpectedData("missing authentication challenge"));
        };
        if encrypted_rnd_b.len() != 8 {
            return Err(Error::UnexpectedData("challenge is not 8 bytes"));
        }

        let mut rnd_b = key.decrypt(encrypted_rnd_b)?.to_vec();
        rnd_b.rotate_left(1);

        let mut rnd_a = [0u8; 8];
        rng().fill_bytes(&mut rnd_a);

        let mut token = rnd_a.to_vec();
        token.extend_from_slice(&rnd_b);
        let token = key.encrypt(&token)?;

        let mut frame = Vec::with_capacity(1 + token.len());
        frame.push(AUTHENTICATE_CONTINUE);
        frame.extend_from_slice(&token);
        let proof = self.pcd.picc_transceive(&frame, false)?;
        let [0x00, encrypted_rnd_a @ ..] = &proof[..] else {
            return Err(Error::UnexpectedData("missing authentication proof"));
        };
        if encrypted_rnd_a.len() != 8 {
            return Err(Error::UnexpectedData("proof is not 8 bytes"));
        }

        let verification = key.decrypt(encrypted_rnd_a)?;
        rnd_a.rotate_left(1);
        if verification[..] != rnd_a {
            warn!(uid = %self.picc.uid, "Card proof did not match, halting");
            if let Err(e) = self.pcd.picc_halt() {
                debug!(error = %e, "Ignoring halt failure");
            }
            return Ok(false);
        }

        debug!(uid = %self.picc.uid, "Authenticated");
        Ok(true)
    }

    /// Store a new 16 byte 3DES key
    ///
    /// Each 8 byte half is written byte-reversed, second word first.
    pub fn write_des_key(&mut self, key: &[u8; 16]) -> Result<()> {
        for (offset, half) in key.chunks_exact(8).enumerate() {
            let page = KEY_PAGE + 2 * offset as u8;
            self.write(page, &reversed(&half[4..8]))?;
            self.write(page + 1, &reversed(&half[0..4]))?;
        }
        Ok(())
    }

    /// Current value of the one-way counter
    pub fn read_counter(&mut self) -> Result<u16> {
        let data = self.read(COUNTER_PAGE)?;
        Ok(u16::from_le_bytes([data[0], data[1]]))
    }

    /// Add `delta` to the one-way counter
    pub fn increment_counter(&mut self, delta: u16) -> Result<()> {
        let [low, high] = delta.to_le_bytes();
        self.write(COUNTER_PAGE, &[low, high, 0x00, 0x00])
    }

    /// Require authentication from `start_page` on
    ///
    /// A start page of [`PROTECTION_DISABLED`] lifts the protection.
    pub fn configure_protection(&mut self, start_page: u8, mode: ProtectionMode) -> Result<()> {
        if start_page > PROTECTION_DISABLED {
            return Err(PiccError::invalid_argument("start page beyond 0x30").into());
        }
        self.write(AUTH1_PAGE, &[mode.auth1(), 0x00, 0x00, 0x00])?;
        self.write(AUTH0_PAGE, &[start_page, 0x00, 0x00, 0x00])
    }
}

fn reversed(word: &[u8]) -> [u8; PAGE_SIZE] {
    [word[3], word[2], word[1], word[0]]
}
