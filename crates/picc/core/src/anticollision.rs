//! Type A activation: REQA/WUPA, cascaded anti-collision and HLTA
//!
//! Every level of the cascade runs the same loop: send the UID bits known so
//! far, merge what the card answers, and on a collision force the colliding
//! bit to 1 and continue from there. Once all 32 bits of the level are known
//! a full SELECT with BCC and CRC_A returns the SAK.

use tracing::{debug, trace};

use crate::{
    Error, Result,
    config::ProtocolConfig,
    picc::{CASCADE_TAG, Picc, Sak, Uid},
    transceiver::{CollisionPosition, PcdTransceiver},
};

/// SEL codes of cascade levels 1 to 3
pub const SELECT_CASCADE: [u8; 3] = [0x93, 0x95, 0x97];

/// HLTA command
pub const PICC_HLTA: u8 = 0x50;

/// NVB of a full SELECT: 7 whole bytes
const NVB_FULL_SELECT: u8 = 0x70;

const UID_LEVEL_BITS: u8 = 32;

/// Short frame waking cards up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCommand {
    /// REQA, only wakes cards in IDLE state
    Reqa,
    /// WUPA, also wakes cards in HALT state
    Wupa,
}

impl RequestCommand {
    /// Command byte, sent as a 7-bit frame
    pub const fn code(self) -> u8 {
        match self {
            Self::Reqa => 0x26,
            Self::Wupa => 0x52,
        }
    }
}

/// Type A activation commands available on every transceiver
pub trait PiccCommands: PcdTransceiver {
    /// Send REQA or WUPA and return the ATQA
    fn picc_request(&mut self, command: RequestCommand) -> Result<[u8; 2]>;

    /// Run the anti-collision loop over all cascade levels and select the card
    fn picc_select(&mut self, config: &ProtocolConfig) -> Result<Picc>;

    /// Send HLTA; a silent card means success
    fn picc_halt(&mut self) -> Result<()>;

    /// Halt, wake and select again; `true` when the same card answered
    fn reestablish_picc_communication(&mut self, uid: &Uid, config: &ProtocolConfig)
    -> Result<bool>;

    /// REQA followed by selection
    fn activate(&mut self, config: &ProtocolConfig) -> Result<Picc> {
        self.picc_request(RequestCommand::Reqa)?;
        self.picc_select(config)
    }
}

impl<T: PcdTransceiver + ?Sized> PiccCommands for T {
    fn picc_request(&mut self, command: RequestCommand) -> Result<[u8; 2]> {
        let reception = self.transceive_bits(&[command.code()], 7)?;

        if reception.collision.is_some() {
            return Err(Error::Collision);
        }
        // ATQA is always 16 whole bits
        if reception.data.len() != 2 || reception.valid_bits != 0 {
            return Err(Error::unexpected("ATQA must be 16 bits"));
        }

        Ok([reception.data[0], reception.data[1]])
    }

    fn picc_select(&mut self, config: &ProtocolConfig) -> Result<Picc> {
        let mut uid = Vec::with_capacity(10);

        for (level, &sel) in SELECT_CASCADE.iter().enumerate() {
            let (uid_cl, sak) = select_level(self, sel, config.anticollision_iterations)?;
            debug!(level = level + 1, uid = %hex::encode(uid_cl), %sak, "Cascade level selected");

            if sak.cascade() {
                if uid_cl[0] != CASCADE_TAG {
                    return Err(Error::unexpected("cascade tag missing"));
                }
                uid.extend_from_slice(&uid_cl[1..]);
                continue;
            }

            uid.extend_from_slice(&uid_cl);
            let uid = Uid::new(uid)?;
            debug!(%uid, %sak, "PICC selected");
            return Ok(Picc::new(uid, sak));
        }

        Err(Error::unexpected("SAK requested a fourth cascade level"))
    }

    fn picc_halt(&mut self) -> Result<()> {
        match self.picc_transceive(&[PICC_HLTA, 0x00], false) {
            Err(Error::PiccTimeout) => Ok(()),
            Ok(_) => Err(Error::unexpected("card answered HLTA")),
            Err(e) => Err(e),
        }
    }

    fn reestablish_picc_communication(
        &mut self,
        uid: &Uid,
        config: &ProtocolConfig,
    ) -> Result<bool> {
        // A card already in HALT state may answer oddly, ignore it
        if let Err(e) = self.picc_halt() {
            trace!(error = %e, "Ignoring HLTA failure");
        }
        self.picc_request(RequestCommand::Wupa)?;
        let picc = self.picc_select(config)?;

        Ok(picc.uid == *uid)
    }
}

/// One cascade level: returns the 4 UID bytes (possibly starting with the
/// cascade tag) and the SAK
fn select_level<T: PcdTransceiver + ?Sized>(
    pcd: &mut T,
    sel: u8,
    iterations: usize,
) -> Result<([u8; 4], Sak)> {
    // UID bytes of the level followed by the BCC
    let mut level = [0u8; 5];
    let mut known_bits: u8 = 0;

    for _ in 0..iterations {
        if known_bits >= UID_LEVEL_BITS {
            let [uid0, uid1, uid2, uid3, bcc] = level;
            let uid_cl = [uid0, uid1, uid2, uid3];
            if bcc != uid_cl.iter().fold(0u8, |acc, b| acc ^ b) {
                return Err(Error::Communication("UID check byte mismatch"));
            }
            let sak = full_select(pcd, sel, &uid_cl)?;
            return Ok((uid_cl, sak));
        }

        let full_bytes = usize::from(known_bits / 8);
        let tx_last_bits = known_bits % 8;
        let nvb = ((2 + full_bytes as u8) << 4) | tx_last_bits;

        let mut frame = Vec::with_capacity(7);
        frame.push(sel);
        frame.push(nvb);
        let sent_uid_bytes = full_bytes + usize::from(tx_last_bits != 0);
        frame.extend_from_slice(&level[..sent_uid_bytes]);

        let reception = pcd.transceive_bits(&frame, tx_last_bits)?;

        // The first received byte shares its low bits with the last sent one
        for (i, &byte) in reception.data.iter().enumerate() {
            let index = full_bytes + i;
            if index >= level.len() {
                break;
            }
            level[index] = if i == 0 && tx_last_bits != 0 {
                let mask = (1u8 << tx_last_bits) - 1;
                (level[index] & mask) | (byte & !mask)
            } else {
                byte
            };
        }

        match reception.collision {
            None => known_bits = UID_LEVEL_BITS,
            Some(CollisionPosition::Unknown) => return Err(Error::Collision),
            Some(CollisionPosition::Bit(position)) => {
                if position == 0 || position > UID_LEVEL_BITS {
                    return Err(Error::unexpected("collision position out of range"));
                }
                if position <= known_bits {
                    return Err(Error::unexpected("collision within known UID bits"));
                }

                let bit = position - 1;
                level[usize::from(bit / 8)] |= 1 << (bit % 8);
                known_bits = position;
                trace!(position, "Collision resolved towards 1");
            }
        }
    }

    Err(Error::unexpected("anti-collision loop did not converge"))
}

fn full_select<T: PcdTransceiver + ?Sized>(pcd: &mut T, sel: u8, uid_cl: &[u8; 4]) -> Result<Sak> {
    let bcc = uid_cl.iter().fold(0u8, |acc, b| acc ^ b);

    let mut frame = Vec::with_capacity(9);
    frame.push(sel);
    frame.push(NVB_FULL_SELECT);
    frame.extend_from_slice(uid_cl);
    frame.push(bcc);
    let crc = pcd.calculate_crc(&frame)?;
    frame.extend_from_slice(&crc);

    let reception = pcd.transceive_bits(&frame, 0)?;
    if reception.collision.is_some() {
        return Err(Error::unexpected("collision within known UID bits"));
    }

    let data = reception.data;
    // SAK is one byte followed by CRC_A
    if data.len() != 3 || reception.valid_bits != 0 {
        return Err(Error::unexpected("incorrect select acknowledge"));
    }
    if pcd.calculate_crc(&data[..1])? != data[1..] {
        return Err(Error::IncorrectCrc);
    }

    Ok(Sak(data[0]))
}
