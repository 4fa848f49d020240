//! Scripted PCD transceiver for tests
//!
//! [`MockPcd`] records every frame it is asked to send and answers with the
//! next scripted [`Reception`]. CRC_A is computed in software.

use std::collections::VecDeque;

use crate::{
    Error, Result,
    transceiver::{BaudRate, Direction, PcdTransceiver, Reception},
};

/// Software CRC_A (ISO/IEC 14443-3), low byte first
pub fn crc_a(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0x6363;
    for &byte in data {
        let mut ch = byte ^ (crc as u8);
        ch ^= ch << 4;
        let ch = ch as u16;
        crc = (crc >> 8) ^ (ch << 8) ^ (ch << 3) ^ (ch >> 4);
    }
    crc.to_le_bytes()
}

/// Append CRC_A to `data`
pub fn with_crc_a(data: &[u8]) -> Vec<u8> {
    let mut frame = data.to_vec();
    frame.extend_from_slice(&crc_a(data));
    frame
}

/// A Crypto1 authentication request seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crypto1Request {
    /// 0x60 for key A, 0x61 for key B
    pub command: u8,
    /// Block address
    pub block: u8,
    /// Sector key
    pub key: [u8; 6],
    /// Last four UID bytes
    pub uid: [u8; 4],
}

/// Scripted transceiver
#[derive(Debug, Default)]
pub struct MockPcd {
    /// Answers returned in order; an exhausted script is a PICC timeout
    pub responses: VecDeque<Result<Reception>>,
    /// Frames that were sent
    pub commands: Vec<Vec<u8>>,
    /// `tx_last_bits` of every sent frame
    pub tx_last_bits: Vec<u8>,
    /// Current timer setting
    pub timer: u32,
    /// Every timer value that was set, in order
    pub timer_history: Vec<u32>,
    /// Current baud rates (transmit, receive)
    pub baud_rates: (BaudRate, BaudRate),
    /// Answers to Crypto1 authentication requests
    pub crypto1_results: VecDeque<bool>,
    /// Crypto1 authentication requests that were made
    pub crypto1_requests: Vec<Crypto1Request>,
    /// Whether the Crypto1 unit is running
    pub crypto1_active: bool,
}

impl MockPcd {
    /// Create a new mock with the given answers
    pub fn new(responses: Vec<Result<Reception>>) -> Self {
        Self {
            responses: responses.into(),
            ..Default::default()
        }
    }

    /// Queue a complete answer, CRC_A appended
    pub fn push_frame(&mut self, data: &[u8]) -> &mut Self {
        self.responses
            .push_back(Ok(Reception::complete(with_crc_a(data))));
        self
    }

    /// Queue a 4-bit ACK
    pub fn push_ack(&mut self) -> &mut Self {
        self.responses
            .push_back(Ok(Reception::nibble(crate::transceiver::MIFARE_ACK)));
        self
    }

    /// Queue an error
    pub fn push_error(&mut self, error: Error) -> &mut Self {
        self.responses.push_back(Err(error));
        self
    }

    /// Sent frames with their CRC_A removed
    pub fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.commands
            .iter()
            .map(|frame| frame[..frame.len().saturating_sub(2)].to_vec())
            .collect()
    }
}

impl PcdTransceiver for MockPcd {
    fn do_transceive_bits(&mut self, frame: &[u8], tx_last_bits: u8) -> Result<Reception> {
        self.commands.push(frame.to_vec());
        self.tx_last_bits.push(tx_last_bits);
        self.responses.pop_front().unwrap_or(Err(Error::PiccTimeout))
    }

    fn calculate_crc(&mut self, data: &[u8]) -> Result<[u8; 2]> {
        Ok(crc_a(data))
    }

    fn internal_timer(&self) -> u32 {
        self.timer
    }

    fn set_internal_timer(&mut self, ticks: u32) -> Result<()> {
        self.timer = ticks;
        self.timer_history.push(ticks);
        Ok(())
    }

    fn baud_rate(&self, direction: Direction) -> BaudRate {
        match direction {
            Direction::Transmit => self.baud_rates.0,
            Direction::Receive => self.baud_rates.1,
        }
    }

    fn set_baud_rate(&mut self, direction: Direction, rate: BaudRate) -> Result<()> {
        match direction {
            Direction::Transmit => self.baud_rates.0 = rate,
            Direction::Receive => self.baud_rates.1 = rate,
        }
        Ok(())
    }

    fn mifare_crypto1_authenticate(
        &mut self,
        command: u8,
        block: u8,
        key: &[u8; 6],
        uid: &[u8; 4],
    ) -> Result<bool> {
        self.crypto1_requests.push(Crypto1Request {
            command,
            block,
            key: *key,
            uid: *uid,
        });
        let accepted = self.crypto1_results.pop_front().unwrap_or(false);
        self.crypto1_active = accepted;
        Ok(accepted)
    }

    fn mifare_crypto1_deauthenticate(&mut self) -> Result<()> {
        self.crypto1_active = false;
        Ok(())
    }
}
