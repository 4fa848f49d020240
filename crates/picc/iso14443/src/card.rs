//! Layer 4 card session

use std::thread;

use bytes::{BufMut, Bytes, BytesMut};
use nexum_picc_core::{
    Error as PiccError, Picc, PiccCommands, ProtocolConfig,
    transceiver::{BaudRate, Direction, PcdTransceiver},
};
use tracing::{debug, trace, warn};

use crate::{
    Error, Result,
    ats::Ats,
    block::{
        BLOCK_NUMBER, CHAINING, CID_FOLLOWING, CMD_PPS, CMD_RATS, I_BLOCK, PPS0_PPS1_PRESENT,
        R_ACK, R_NAK, RATS_FSDI_64, S_DESELECT, S_WTX, inf_offset, is_chaining, is_r_ack,
        is_s_deselect, is_s_wtx,
    },
    transport::BlockTransport,
};

/// Frame size assumed before the ATS announces the real one
const INITIAL_FSC: usize = 16;

/// PCB plus CRC_A
const BLOCK_OVERHEAD: usize = 3;

/// A type A card driven at ISO 14443-4 level
///
/// The session owns its transceiver. Block number, frame size and waiting
/// time are reset by every [`select`](Self::select).
#[derive(Debug)]
pub struct Iso14443Card<T: PcdTransceiver> {
    pcd: T,
    picc: Picc,
    config: ProtocolConfig,
    cid: u8,
    fsc: usize,
    fwt: u32,
    support_cid: bool,
    support_nad: bool,
    block_number: u8,
    selected: bool,
    max_inf_size: usize,
}

impl<T: PcdTransceiver> Iso14443Card<T> {
    /// Wrap a card that completed type A selection
    pub fn new(pcd: T, picc: Picc, config: ProtocolConfig) -> Self {
        let fwt = config.default_fwt;
        let max_inf_size = config
            .max_frame_size
            .min(INITIAL_FSC)
            .saturating_sub(BLOCK_OVERHEAD);
        Self {
            pcd,
            picc,
            config,
            cid: 0,
            fsc: INITIAL_FSC,
            fwt,
            support_cid: false,
            support_nad: false,
            block_number: 0,
            selected: false,
            max_inf_size,
        }
    }

    /// Identity of the card
    pub const fn picc(&self) -> &Picc {
        &self.picc
    }

    /// Whether the card is selected at layer 4
    pub const fn is_selected(&self) -> bool {
        self.selected
    }

    /// Frame size the card accepts
    pub const fn fsc(&self) -> usize {
        self.fsc
    }

    /// Frame waiting time in timer ticks
    pub const fn fwt(&self) -> u32 {
        self.fwt
    }

    /// Whether the card accepts a CID in block prologues
    pub const fn supports_cid(&self) -> bool {
        self.support_cid
    }

    /// Whether the card accepts a NAD in block prologues
    pub const fn supports_nad(&self) -> bool {
        self.support_nad
    }

    /// Current block number
    pub const fn block_number(&self) -> u8 {
        self.block_number
    }

    /// Access the transceiver
    pub const fn pcd_mut(&mut self) -> &mut T {
        &mut self.pcd
    }

    /// Release the transceiver
    pub fn into_inner(self) -> T {
        self.pcd
    }

    /// Activate the card at layer 4: RATS, ATS processing and PPS
    pub fn select(&mut self) -> Result<Ats> {
        self.selected = false;
        let rats = [CMD_RATS, RATS_FSDI_64 | self.cid];
        let response = self.pcd.picc_transceive(&rats, false)?;
        let ats = Ats::parse(&response)?;

        self.fsc = ats.fsc;
        if let Some(fwt) = ats.fwt() {
            self.fwt = fwt;
            self.pcd.set_internal_timer(fwt)?;
        }
        self.support_cid = ats.support_cid;
        self.support_nad = ats.support_nad;

        // Start-up frame guard time
        thread::sleep(self.config.guard_time_unit * ats.sgft());

        // Negotiation stays at the base rate whatever the card offers
        let (dr, ds) = (BaudRate::Kbps106, BaudRate::Kbps106);
        debug!(
            max_dr = ?ats.max_dr,
            max_ds = ?ats.max_ds,
            ?dr,
            ?ds,
            "Negotiating bit rates"
        );

        let pps = [
            CMD_PPS | self.cid,
            PPS0_PPS1_PRESENT,
            (ds.divisor() << 2) | dr.divisor(),
        ];
        let response = self.pcd.picc_transceive(&pps, false)?;
        if response.first() != Some(&(CMD_PPS | self.cid)) {
            return Err(Error::unexpected("PPS response does not echo PPSS"));
        }

        self.pcd.set_baud_rate(Direction::Transmit, dr)?;
        self.pcd.set_baud_rate(Direction::Receive, ds)?;

        // Outgoing I-blocks carry neither CID nor NAD
        self.max_inf_size = self
            .config
            .max_frame_size
            .min(self.fsc)
            .saturating_sub(BLOCK_OVERHEAD);
        if self.max_inf_size == 0 {
            return Err(Error::InvalidAts("frame size too small"));
        }

        self.block_number = 0;
        self.selected = true;

        debug!(
            uid = %self.picc.uid,
            fsc = self.fsc,
            fwt = self.fwt,
            max_inf_size = self.max_inf_size,
            "Card selected at ISO 14443-4 level"
        );
        Ok(ats)
    }

    /// Deselect, halt, wake and select the card at type A level again
    ///
    /// Returns `true` when the same card answered. The card has to be
    /// selected at layer 4 again before further block exchange.
    pub fn resume_communication(&mut self) -> Result<bool> {
        if let Err(e) = BlockTransport::deselect(self) {
            trace!(error = %e, "Ignoring S(DESELECT) failure");
        }
        self.selected = false;
        Ok(self
            .pcd
            .reestablish_picc_communication(&self.picc.uid, &self.config)?)
    }

    /// Send `frame`, serving waiting time extensions and answering silence
    /// with R(NAK), until the card sends a real answer
    fn handle_wtx(&mut self, frame: &[u8]) -> Result<Bytes> {
        let mut frame = Bytes::copy_from_slice(frame);

        for _ in 0..self.config.wtx_retries {
            let response = match self.pcd.picc_transceive(&frame, false) {
                Ok(response) => response,
                Err(PiccError::PiccTimeout) => {
                    debug!(block_number = self.block_number, "Card silent, sending R(NAK)");
                    frame = Bytes::copy_from_slice(&[R_NAK | self.block_number]);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let pcb = *response
                .first()
                .ok_or(Error::unexpected("empty block"))?;

            if is_s_wtx(pcb) {
                let position = if pcb & CID_FOLLOWING != 0 { 2 } else { 1 };
                let wtxm = response
                    .get(position)
                    .ok_or(Error::unexpected("S(WTX) without INF"))?
                    & 0x3F;
                trace!(wtxm, "Waiting time extension requested");

                self.pcd.set_internal_timer(self.fwt * u32::from(wtxm))?;
                frame = Bytes::copy_from_slice(&[S_WTX, wtxm]);
                continue;
            }

            self.pcd.set_internal_timer(self.fwt)?;
            return Ok(response);
        }

        self.pcd.set_internal_timer(self.fwt)?;
        warn!("Card did not answer within the retry limit");
        Err(PiccError::PiccTimeout.into())
    }

    fn toggle_block_number(&mut self) {
        self.block_number ^= BLOCK_NUMBER;
    }
}

impl<T: PcdTransceiver> BlockTransport for Iso14443Card<T> {
    fn do_transceive(&mut self, data: &[u8]) -> Result<Bytes> {
        if !self.selected {
            return Err(Error::NotSelected);
        }

        let chunks: Vec<&[u8]> = if data.is_empty() {
            vec![data]
        } else {
            data.chunks(self.max_inf_size).collect()
        };
        let last = chunks.len() - 1;

        let mut response = Bytes::new();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let mut pcb = I_BLOCK | self.block_number;
            if index < last {
                pcb |= CHAINING;
            }

            let mut frame = BytesMut::with_capacity(chunk.len() + 1);
            frame.put_u8(pcb);
            frame.extend_from_slice(chunk);

            let mut retransmissions = 0;
            response = loop {
                let answer = self.handle_wtx(&frame)?;
                let r_pcb = answer[0];

                // R(ACK) for another block number asks for the same block again
                if is_r_ack(r_pcb) && (r_pcb & BLOCK_NUMBER) != (pcb & BLOCK_NUMBER) {
                    retransmissions += 1;
                    if retransmissions > self.config.retransmissions {
                        return Err(Error::RetransmissionLimit);
                    }
                    trace!(retransmissions, "Resending I-block");
                    continue;
                }
                break answer;
            };

            self.toggle_block_number();
        }

        let mut frames = vec![response];
        while frames.last().is_some_and(|frame| is_chaining(frame[0])) {
            let ack = [R_ACK | self.block_number];
            let answer = self.handle_wtx(&ack)?;
            frames.push(answer);
            self.toggle_block_number();
        }

        let mut inf = BytesMut::new();
        for frame in &frames {
            let offset = inf_offset(frame[0]);
            if frame.len() > offset {
                inf.extend_from_slice(&frame[offset..]);
            }
        }

        Ok(inf.freeze())
    }

    fn max_inf_size(&self) -> usize {
        self.max_inf_size
    }

    fn deselect(&mut self) -> Result<()> {
        let response = self.pcd.picc_transceive(&[S_DESELECT], false)?;
        match response.first() {
            Some(&pcb) if is_s_deselect(pcb) => {
                self.selected = false;
                debug!(uid = %self.picc.uid, "Card deselected");
                Ok(())
            }
            _ => Err(Error::unexpected("S(DESELECT) not acknowledged")),
        }
    }

    fn halt(&mut self) -> Result<()> {
        if let Err(e) = BlockTransport::deselect(self) {
            trace!(error = %e, "Ignoring S(DESELECT) failure");
        }
        self.selected = false;
        Ok(self.pcd.picc_halt()?)
    }
}
