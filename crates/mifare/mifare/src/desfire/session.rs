//! Authenticated DESFire session

use std::fmt;

use crate::{CipherSuite, Error, Key, Result};

/// Session established by a successful authentication
///
/// Holds the session key, whose CBC chain carries the IV for CMAC and
/// encryption of every following command.
#[derive(Clone)]
pub struct Session {
    key_number: u8,
    key: Key,
}

impl Session {
    /// Create a session from an already derived session key
    pub const fn new(key_number: u8, key: Key) -> Self {
        Self { key_number, key }
    }

    /// Derive the session key from both random numbers of the handshake
    ///
    /// `rnd_a` is the reader's random number, `rnd_b` the card's.
    pub fn derive(key_number: u8, auth_key: &Key, rnd_a: &[u8], rnd_b: &[u8]) -> Result<Self> {
        let suite = auth_key.cipher_suite();
        let needed = match suite {
            CipherSuite::Des | CipherSuite::TdesEde2 => 8,
            CipherSuite::TdesEde3 | CipherSuite::Aes128 => 16,
        };
        if rnd_a.len() < needed || rnd_b.len() < needed {
            return Err(Error::InvalidArgument("random numbers too short for the key type"));
        }

        let mut session_key = Vec::with_capacity(suite.key_size());

        let mut take = |range: std::ops::Range<usize>| {
            session_key.extend_from_slice(&rnd_a[range.clone()]);
            session_key.extend_from_slice(&rnd_b[range]);
        };

        take(0..4);
        match suite {
            CipherSuite::Des => {}
            CipherSuite::TdesEde2 => take(4..8),
            CipherSuite::TdesEde3 => {
                take(6..10);
                take(12..16);
            }
            CipherSuite::Aes128 => take(12..16),
        }

        let key = Key::new(auth_key.key_type(), &session_key, 0)?;
        Ok(Self::new(key_number, key))
    }

    /// Key number the session was authenticated with
    pub const fn key_number(&self) -> u8 {
        self.key_number
    }

    /// Session key
    pub const fn key(&self) -> &Key {
        &self.key
    }

    /// Session key, for operations advancing its CBC chain
    pub const fn key_mut(&mut self) -> &mut Key {
        &mut self.key
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key_number", &self.key_number)
            .field("cipher_suite", &self.key.cipher_suite())
            .finish_non_exhaustive()
    }
}
