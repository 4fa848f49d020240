//! Answer To Select parsing

use bytes::Bytes;
use nexum_picc_core::transceiver::BaudRate;

use crate::{Error, Result};

/// Frame size for each FSCI value; larger FSCI values are treated as 256
pub const FSCI_TO_FSC: [usize; 9] = [16, 24, 32, 40, 48, 64, 96, 128, 256];

/// FSCI assumed when the card sends no format byte
const DEFAULT_FSCI: u8 = 2;

/// FWI assumed when the card sends no TB(1), or an RFU value
const DEFAULT_FWI: u8 = 4;

const T0_TA_PRESENT: u8 = 0x10;
const T0_TB_PRESENT: u8 = 0x20;
const T0_TC_PRESENT: u8 = 0x40;

const TC_NAD_SUPPORTED: u8 = 0x01;
const TC_CID_SUPPORTED: u8 = 0x02;

/// Parsed ATS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ats {
    /// Largest frame the card accepts, in bytes
    pub fsc: usize,
    /// Fastest PCD to PICC rate the card supports
    pub max_dr: BaudRate,
    /// Fastest PICC to PCD rate the card supports
    pub max_ds: BaudRate,
    /// Frame waiting time integer, when announced
    pub fwi: Option<u8>,
    /// Start-up frame guard time integer, when announced
    pub sgfi: Option<u8>,
    /// Card accepts a CID
    pub support_cid: bool,
    /// Card accepts a NAD
    pub support_nad: bool,
    /// Historical bytes
    pub historical: Bytes,
}

impl Ats {
    /// Parse an ATS, starting with its length byte TL
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (&tl, rest) = data
            .split_first()
            .ok_or(Error::InvalidAts("empty answer"))?;
        if usize::from(tl) != data.len() {
            return Err(Error::InvalidAts("length byte does not match"));
        }

        let mut ats = Self {
            fsc: FSCI_TO_FSC[usize::from(DEFAULT_FSCI)],
            max_dr: BaudRate::Kbps106,
            max_ds: BaudRate::Kbps106,
            fwi: None,
            sgfi: None,
            support_cid: true,
            support_nad: false,
            historical: Bytes::new(),
        };

        let Some((&t0, mut rest)) = rest.split_first() else {
            return Ok(ats);
        };

        let fsci = usize::from(t0 & 0x0F).min(FSCI_TO_FSC.len() - 1);
        ats.fsc = FSCI_TO_FSC[fsci];

        let mut next = || -> Result<u8> {
            let (&byte, tail) = rest
                .split_first()
                .ok_or(Error::InvalidAts("interface byte missing"))?;
            rest = tail;
            Ok(byte)
        };

        if t0 & T0_TA_PRESENT != 0 {
            let ta = next()?;
            ats.max_dr = BaudRate::highest_supported(ta & 0x07);
            ats.max_ds = BaudRate::highest_supported((ta >> 4) & 0x07);
        }

        if t0 & T0_TB_PRESENT != 0 {
            let tb = next()?;
            let fwi = tb >> 4;
            ats.fwi = Some(if fwi > 14 { DEFAULT_FWI } else { fwi });
            let sgfi = tb & 0x0F;
            ats.sgfi = Some(if sgfi > 14 { 0 } else { sgfi });
        }

        if t0 & T0_TC_PRESENT != 0 {
            let tc = next()?;
            ats.support_cid = tc & TC_CID_SUPPORTED != 0;
            ats.support_nad = tc & TC_NAD_SUPPORTED != 0;
        }

        ats.historical = Bytes::copy_from_slice(rest);
        Ok(ats)
    }

    /// Frame waiting time in timer ticks
    pub const fn fwt(&self) -> Option<u32> {
        match self.fwi {
            Some(fwi) => Some(1 << fwi),
            None => None,
        }
    }

    /// Start-up frame guard time multiplier
    pub const fn sgft(&self) -> u32 {
        match self.sgfi {
            Some(sgfi) => 1 << sgfi,
            None => 1,
        }
    }
}
