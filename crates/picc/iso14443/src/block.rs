//! Protocol control byte coding

/// Request for answer to select
pub const CMD_RATS: u8 = 0xE0;
/// Protocol and parameter selection
pub const CMD_PPS: u8 = 0xD0;
/// PPS0 announcing PPS1
pub const PPS0_PPS1_PRESENT: u8 = 0x11;
/// FSDI sent in RATS: the reader accepts 64 byte frames
pub const RATS_FSDI_64: u8 = 0x50;

/// I-block PCB without block number
pub const I_BLOCK: u8 = 0x02;
/// R(ACK) PCB without block number
pub const R_ACK: u8 = 0xA2;
/// R(NAK) PCB without block number
pub const R_NAK: u8 = 0xB2;
/// S(DESELECT)
pub const S_DESELECT: u8 = 0xC2;
/// S(WTX)
pub const S_WTX: u8 = 0xF2;

/// Chaining bit of I-blocks
pub const CHAINING: u8 = 0x10;
/// CID following
pub const CID_FOLLOWING: u8 = 0x08;
/// NAD following
pub const NAD_FOLLOWING: u8 = 0x04;
/// Block number bit
pub const BLOCK_NUMBER: u8 = 0x01;

/// Whether `pcb` is an R(ACK), ignoring block number and CID bit
pub const fn is_r_ack(pcb: u8) -> bool {
    pcb & 0xF6 == R_ACK
}

/// Whether `pcb` is an S(WTX), ignoring the CID bit
pub const fn is_s_wtx(pcb: u8) -> bool {
    pcb & 0xF7 == S_WTX
}

/// Whether `pcb` is an S(DESELECT), ignoring the CID bit
pub const fn is_s_deselect(pcb: u8) -> bool {
    pcb & 0xF7 == S_DESELECT
}

/// Whether more blocks of the same chain follow
pub const fn is_chaining(pcb: u8) -> bool {
    pcb & CHAINING != 0
}

/// Offset of the INF field in a block with this PCB
pub const fn inf_offset(pcb: u8) -> usize {
    let mut offset = 1;
    if pcb & CID_FOLLOWING != 0 {
        offset += 1;
    }
    if pcb & NAD_FOLLOWING != 0 {
        offset += 1;
    }
    offset
}
