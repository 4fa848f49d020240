//! DESFire frame exchange with secure messaging
//!
//! Every native command goes through [`DesFire::transceive`]. It applies the
//! requested protection to the outgoing frame, splits it into transport sized
//! chunks, collects continuation frames and verifies the protection of the
//! answer. Any error status or integrity failure ends the session.

use bytes::{BufMut, Bytes, BytesMut};
use nexum_picc_iso14443::BlockTransport;
use tracing::{trace, warn};

use super::{DesFire, Status, constants::ADDITIONAL_FRAME};
use crate::{Error, Result, crc::crc32};

/// Length of the CMAC carried in frames
const CMAC_LENGTH: usize = 8;
/// Length of the CRC32 inside encrypted payloads
const CRC_LENGTH: usize = 4;

/// Protection applied to one direction of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommMode {
    /// No protection
    #[default]
    Plain,
    /// CMAC computed to keep the IV chain, not transmitted
    Cmac,
    /// CMAC computed and transmitted
    SendCmac,
    /// Payload encrypted with an appended CRC32
    Encrypt,
}

impl CommMode {
    const fn is_cmac(self) -> bool {
        matches!(self, Self::Cmac | Self::SendCmac)
    }
}

/// A command to exchange with the card
#[derive(Debug, Clone, Default)]
pub struct Exchange {
    cmd: u8,
    plain_data: Vec<u8>,
    data: Vec<u8>,
    tx: CommMode,
    rx: CommMode,
    expect: Option<Status>,
    receive_all: bool,
    receive_length: Option<usize>,
}

impl Exchange {
    /// Create an exchange for command `cmd`
    pub fn new(cmd: u8) -> Self {
        Self {
            cmd,
            ..Default::default()
        }
    }

    /// Header sent in the clear even when the payload is encrypted
    pub fn plain_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.plain_data = data.into();
        self
    }

    /// Payload subject to the transmit protection
    pub fn data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    /// Protection of the command
    pub const fn tx(mut self, mode: CommMode) -> Self {
        self.tx = mode;
        self
    }

    /// Protection of the answer
    pub const fn rx(mut self, mode: CommMode) -> Self {
        self.rx = mode;
        self
    }

    /// Status the answer must carry
    pub const fn expect(mut self, status: Status) -> Self {
        self.expect = Some(status);
        self
    }

    /// Keep requesting continuation frames while the card has more data
    pub const fn receive_all(mut self) -> Self {
        self.receive_all = true;
        self
    }

    /// Length of the decrypted answer without padding; 0 when unknown
    pub const fn receive_length(mut self, length: usize) -> Self {
        self.receive_length = Some(length);
        self
    }
}

/// Status and payload of an answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Final status
    pub status: Status,
    /// Payload of all frames, stripped of status bytes, CMAC and padding
    pub data: Bytes,
}

impl<B: BlockTransport> DesFire<B> {
    /// Exchange a command with the card, applying secure messaging
    pub fn transceive(&mut self, exchange: Exchange) -> Result<Response> {
        let Exchange {
            cmd,
            plain_data,
            mut data,
            tx,
            rx,
            expect,
            receive_all,
            receive_length,
        } = exchange;

        if (tx == CommMode::Encrypt || rx == CommMode::Encrypt) && self.session.is_none() {
            return Err(Error::Unauthenticated);
        }

        let mut frame = BytesMut::with_capacity(1 + plain_data.len() + data.len() + 16);
        frame.put_u8(cmd);
        frame.extend_from_slice(&plain_data);

        if tx == CommMode::Encrypt {
            let session = self.session.as_mut().ok_or(Error::Unauthenticated)?;
            let crc = crc32(&[&frame[..], &data[..]]);
            data.extend_from_slice(&crc.to_le_bytes());
            data = session.key_mut().encrypt(&data)?.to_vec();
        }
        frame.extend_from_slice(&data);

        if tx.is_cmac() && cmd != ADDITIONAL_FRAME {
            if let Some(session) = self.session.as_mut() {
                self.cmac_buffer.clear();
                self.cmac_buffer.extend_from_slice(&frame);
                let cmac = session.key_mut().calculate_cmac(&self.cmac_buffer)?;
                if tx == CommMode::SendCmac {
                    frame.extend_from_slice(&cmac[..CMAC_LENGTH]);
                }
            }
        }

        let (status, mut received) = self.exchange_frames(frame.freeze(), receive_all)?;

        if !status.is_ok() {
            warn!(cmd, %status, "Card returned error status");
            self.invalidate();
            return Err(Error::ReceiptStatus(status));
        }

        if expect.is_some_and(|expected| expected != status) {
            return Err(Error::UnexpectedData(
                "card status does not match expected value",
            ));
        }

        if rx.is_cmac() {
            let mut verified = true;
            if let Some(session) = self.session.as_mut() {
                if cmd != ADDITIONAL_FRAME {
                    self.cmac_buffer.clear();
                }
                if status == Status::ADDITIONAL_FRAME {
                    self.cmac_buffer.extend_from_slice(&received);
                } else if received.len() >= CMAC_LENGTH {
                    let received_cmac = received.split_off(received.len() - CMAC_LENGTH);
                    self.cmac_buffer.extend_from_slice(&received);
                    self.cmac_buffer.put_u8(status.0);
                    let cmac = session.key_mut().calculate_cmac(&self.cmac_buffer)?;
                    verified = cmac[..CMAC_LENGTH] == received_cmac[..];
                } else {
                    // A session answer always ends with its CMAC
                    verified = false;
                }
            }
            if !verified {
                return Err(self.integrity_failure(cmd, "CMAC mismatch"));
            }
        }

        if rx == CommMode::Encrypt {
            let length = receive_length.ok_or(Error::UnexpectedData(
                "lack of receive length for removing padding",
            ))?;
            received = self.decrypt_answer(cmd, status, &received, length)?;
        }

        Ok(Response {
            status,
            data: received.freeze(),
        })
    }

    /// Send `frame` in chunks and gather the answer frames
    fn exchange_frames(&mut self, mut pending: Bytes, receive_all: bool) -> Result<(Status, BytesMut)> {
        let max_inf_size = self.transport.max_inf_size().max(2);
        let mut received = BytesMut::new();

        loop {
            let chunk = pending.split_to(pending.len().min(max_inf_size));
            let answer = self.transport.transceive(&chunk)?;
            let (&status, payload) = answer
                .split_first()
                .ok_or(Error::UnexpectedData("answer without status"))?;
            let status = Status(status);
            received.extend_from_slice(payload);

            if status != Status::ADDITIONAL_FRAME || (pending.is_empty() && !receive_all) {
                trace!(%status, length = received.len(), "Exchange complete");
                return Ok((status, received));
            }

            let mut next = BytesMut::with_capacity(pending.len() + 1);
            next.put_u8(ADDITIONAL_FRAME);
            next.extend_from_slice(&pending);
            pending = next.freeze();
        }
    }

    /// Decrypt an answer and check its CRC32
    fn decrypt_answer(
        &mut self,
        cmd: u8,
        status: Status,
        received: &[u8],
        length: usize,
    ) -> Result<BytesMut> {
        let session = self.session.as_mut().ok_or(Error::Unauthenticated)?;
        let Ok(decrypted) = session.key_mut().decrypt(received) else {
            return Err(self.integrity_failure(cmd, "encrypted answer not block aligned"));
        };

        let payload = if length > 0 {
            let end = decrypted.len().min(length + CRC_LENGTH);
            verified_payload(&decrypted[..end], status)
        } else {
            padding_candidates(&decrypted)
                .find_map(|end| verified_payload(&decrypted[..end], status))
        };
        let Some(payload) = payload else {
            return Err(self.integrity_failure(cmd, "CRC mismatch"));
        };

        Ok(BytesMut::from(payload))
    }

    fn integrity_failure(&mut self, cmd: u8, reason: &'static str) -> Error {
        warn!(cmd, reason, "Answer failed integrity check");
        self.invalidate();
        Error::ReceiptIntegrity
    }
}

/// Possible payload ends of a decrypted answer of unknown length
///
/// The answer either carries ISO 9797-1 method 2 padding (`80 00 ..`) or is
/// block aligned without padding; the CRC decides which.
fn padding_candidates(data: &[u8]) -> impl Iterator<Item = usize> {
    let padded = data
        .iter()
        .rposition(|&byte| byte != 0x00)
        .filter(|&index| data[index] == 0x80);
    padded.into_iter().chain(std::iter::once(data.len()))
}

/// Payload of `data` when it ends with a valid CRC32 over payload and status
fn verified_payload(data: &[u8], status: Status) -> Option<&[u8]> {
    let split = data.len().checked_sub(CRC_LENGTH)?;
    let (payload, crc) = data.split_at(split);
    (crc32(&[payload, &[status.0]]).to_le_bytes() == crc).then_some(payload)
}
