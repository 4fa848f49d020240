//! In-memory MIFARE Ultralight-C

use nexum_mifare::{
    Key, KeyType,
    ultralight::{
        AUTH0_PAGE, AUTH1_PAGE, AUTHENTICATE, AUTHENTICATE_CONTINUE, COUNTER_PAGE, KEY_PAGE, READ,
        WRITE,
    },
};
use nexum_picc_core::{
    BaudRate, Direction, Error as PiccError, PcdTransceiver, Reception, Result as PiccResult,
    mock::{crc_a, with_crc_a},
};

/// Factory key "BREAKMEIFYOUCAN!"
pub const DEFAULT_KEY: [u8; 16] = *b"BREAKMEIFYOUCAN!";

const PAGES: usize = 48;
const RND_B: [u8; 8] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];

/// Simulated Ultralight-C
#[derive(Debug)]
pub struct SimulatedUltralightC {
    /// Page contents
    pub pages: [[u8; 4]; PAGES],
    /// Answer authentication with a wrong proof
    pub forge_proof: bool,
    /// Set once the card saw HLTA
    pub halted: bool,
    authenticated: bool,
    pending_auth: Option<Key>,
    timer: u32,
}

impl SimulatedUltralightC {
    /// Blank card holding `key`, protection disabled
    pub fn new(key: &[u8; 16]) -> Self {
        let mut pages = [[0u8; 4]; PAGES];
        pages[usize::from(AUTH0_PAGE)] = [0x30, 0x00, 0x00, 0x00];
        for (offset, half) in key.chunks_exact(8).enumerate() {
            let page = usize::from(KEY_PAGE) + 2 * offset;
            pages[page] = reversed(&half[4..8]);
            pages[page + 1] = reversed(&half[0..4]);
        }

        Self {
            pages,
            forge_proof: false,
            halted: false,
            authenticated: false,
            pending_auth: None,
            timer: 0,
        }
    }

    /// Current counter value
    pub fn counter(&self) -> u16 {
        let page = self.pages[usize::from(COUNTER_PAGE)];
        u16::from_le_bytes([page[0], page[1]])
    }

    fn key(&self) -> Key {
        let page = |p: u8| reversed(&self.pages[usize::from(p)]);
        let mut key = Vec::with_capacity(16);
        key.extend_from_slice(&page(KEY_PAGE + 1));
        key.extend_from_slice(&page(KEY_PAGE));
        key.extend_from_slice(&page(KEY_PAGE + 3));
        key.extend_from_slice(&page(KEY_PAGE + 2));
        Key::new(KeyType::Des, &key, 0).expect("16 byte key")
    }

    fn protected(&self, page: u8, write: bool) -> bool {
        let start = self.pages[usize::from(AUTH0_PAGE)][0];
        let write_only = self.pages[usize::from(AUTH1_PAGE)][0] & 0x01 != 0;
        !self.authenticated && page >= start && (write || !write_only)
    }

    fn answer(&mut self, payload: &[u8]) -> PiccResult<Reception> {
        let Some(&cmd) = payload.first() else {
            return Ok(nak());
        };

        if cmd != AUTHENTICATE_CONTINUE {
            self.pending_auth = None;
        }

        match (cmd, payload.len()) {
            (0x50, 2) => {
                self.halted = true;
                self.authenticated = false;
                Err(PiccError::PiccTimeout)
            }
            (AUTHENTICATE, 2) => {
                self.authenticated = false;
                let mut key = self.key();
                let challenge = key.encrypt(&RND_B).expect("encrypt");
                self.pending_auth = Some(key);

                let mut frame = vec![AUTHENTICATE_CONTINUE];
                frame.extend_from_slice(&challenge);
                Ok(complete(&frame))
            }
            (AUTHENTICATE_CONTINUE, 17) => {
                let Some(mut key) = self.pending_auth.take() else {
                    return Ok(nak());
                };
                let token = key.decrypt(&payload[1..]).expect("aligned token");
                let mut expected = RND_B;
                expected.rotate_left(1);
                if token[8..] != expected {
                    return Ok(nak());
                }

                let mut rnd_a = token[..8].to_vec();
                rnd_a.rotate_left(1);
                if self.forge_proof {
                    rnd_a[0] ^= 0xFF;
                }
                let proof = key.encrypt(&rnd_a).expect("encrypt");
                self.authenticated = true;

                let mut frame = vec![0x00];
                frame.extend_from_slice(&proof);
                Ok(complete(&frame))
            }
            (READ, 2) => {
                let page = payload[1];
                if usize::from(page) >= PAGES || self.protected(page, false) {
                    return Ok(nak());
                }
                let data: Vec<u8> = (0..4)
                    .flat_map(|i| self.pages[(usize::from(page) + i) % PAGES])
                    .collect();
                Ok(complete(&data))
            }
            (WRITE, 6) => {
                let page = payload[1];
                if usize::from(page) >= PAGES || self.protected(page, true) {
                    return Ok(nak());
                }
                let data = [payload[2], payload[3], payload[4], payload[5]];
                if page == COUNTER_PAGE {
                    let counter = self
                        .counter()
                        .checked_add(u16::from_le_bytes([data[0], data[1]]))
                        .ok_or(PiccError::PiccTimeout)?;
                    let [low, high] = counter.to_le_bytes();
                    self.pages[usize::from(page)] = [low, high, 0x00, 0x00];
                } else {
                    self.pages[usize::from(page)] = data;
                }
                Ok(Reception::nibble(0x0A))
            }
            _ => Ok(nak()),
        }
    }
}

impl PcdTransceiver for SimulatedUltralightC {
    fn do_transceive_bits(&mut self, frame: &[u8], _tx_last_bits: u8) -> PiccResult<Reception> {
        let Some(split) = frame.len().checked_sub(2) else {
            return Err(PiccError::PiccTimeout);
        };
        let (payload, crc) = frame.split_at(split);
        if crc_a(payload) != crc {
            return Err(PiccError::PiccTimeout);
        }
        self.answer(payload)
    }

    fn calculate_crc(&mut self, data: &[u8]) -> PiccResult<[u8; 2]> {
        Ok(crc_a(data))
    }

    fn internal_timer(&self) -> u32 {
        self.timer
    }

    fn set_internal_timer(&mut self, ticks: u32) -> PiccResult<()> {
        self.timer = ticks;
        Ok(())
    }

    fn baud_rate(&self, _direction: Direction) -> BaudRate {
        BaudRate::Kbps106
    }

    fn set_baud_rate(&mut self, _direction: Direction, _rate: BaudRate) -> PiccResult<()> {
        Ok(())
    }

    fn mifare_crypto1_authenticate(
        &mut self,
        _command: u8,
        _block: u8,
        _key: &[u8; 6],
        _uid: &[u8; 4],
    ) -> PiccResult<bool> {
        Ok(false)
    }

    fn mifare_crypto1_deauthenticate(&mut self) -> PiccResult<()> {
        Ok(())
    }
}

fn reversed(word: &[u8]) -> [u8; 4] {
    [word[3], word[2], word[1], word[0]]
}

fn complete(data: &[u8]) -> Reception {
    Reception::complete(with_crc_a(data))
}

fn nak() -> Reception {
    Reception::nibble(0x00)
}
