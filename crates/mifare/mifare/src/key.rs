//! Block cipher keys with a chained CBC IV and CMAC
//!
//! A [`Key`] keeps its IV between operations: every `encrypt` and `decrypt`
//! continues the CBC chain where the previous one stopped. DESFire secure
//! messaging and the Ultralight C handshake both rely on that chaining, so
//! callers reset it explicitly with [`Key::clear_iv`].

use std::fmt;

use bytes::Bytes;
use cipher::{
    BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit, block_padding::NoPadding,
};
use des::{Des, TdesEde2, TdesEde3};
#[cfg(feature = "zeroize")]
use zeroize::Zeroize;

use crate::{Error, Result};

/// CMAC constant for 64-bit blocks
const RB_64: u8 = 0x1B;
/// CMAC constant for 128-bit blocks
const RB_128: u8 = 0x87;

/// Key family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// DES, 2K3DES or 3K3DES
    Des,
    /// AES-128
    Aes,
}

/// Cipher used by a key, derived from its type and length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherSuite {
    /// Single DES, carried as 2K3DES with identical halves
    Des,
    /// Two-key triple DES
    TdesEde2,
    /// Three-key triple DES
    TdesEde3,
    /// AES-128
    Aes128,
}

impl CipherSuite {
    /// Cipher block size in bytes
    pub const fn block_size(self) -> usize {
        match self {
            Self::Des | Self::TdesEde2 | Self::TdesEde3 => 8,
            Self::Aes128 => 16,
        }
    }

    /// Length of the key as stored on a card
    pub const fn key_size(self) -> usize {
        match self {
            Self::Des | Self::TdesEde2 | Self::Aes128 => 16,
            Self::TdesEde3 => 24,
        }
    }

    /// Key family of this suite
    pub const fn key_type(self) -> KeyType {
        match self {
            Self::Aes128 => KeyType::Aes,
            _ => KeyType::Des,
        }
    }
}

/// A DES/3DES/AES key with CBC state and CMAC subkeys
#[derive(Clone)]
pub struct Key {
    cipher_suite: CipherSuite,
    version: u8,
    key: Vec<u8>,
    iv: Vec<u8>,
    subkey1: Vec<u8>,
    subkey2: Vec<u8>,
}

impl Key {
    /// Create a key from raw bytes
    ///
    /// DES keys are 8, 16 or 24 bytes and carry `version` in the parity bits
    /// of their first 8 bytes. A 16 byte key with identical halves is single
    /// DES. AES keys are 16 bytes and keep the version separately.
    pub fn new(key_type: KeyType, key: &[u8], version: u8) -> Result<Self> {
        let (cipher_suite, key) = match key_type {
            KeyType::Des => {
                let key = store_key_version(key, version);
                match key.len() {
                    8 => {
                        let mut doubled = key.clone();
                        doubled.extend_from_slice(&key);
                        (CipherSuite::Des, doubled)
                    }
                    16 if same_halves(&key) => (CipherSuite::Des, key),
                    16 => (CipherSuite::TdesEde2, key),
                    24 => (CipherSuite::TdesEde3, key),
                    _ => return Err(Error::InvalidKey("DES keys are 8, 16 or 24 bytes")),
                }
            }
            KeyType::Aes => {
                if key.len() != 16 {
                    return Err(Error::InvalidKey("AES keys are 16 bytes"));
                }
                (CipherSuite::Aes128, key.to_vec())
            }
        };

        let block_size = cipher_suite.block_size();
        let mut this = Self {
            cipher_suite,
            version,
            key,
            iv: vec![0; block_size],
            subkey1: Vec::new(),
            subkey2: Vec::new(),
        };
        this.generate_cmac_subkeys()?;
        Ok(this)
    }

    /// Create a key from a hex string
    pub fn from_hex(key_type: KeyType, key: &str, version: u8) -> Result<Self> {
        let bytes = hex::decode(key).map_err(|_| Error::InvalidKey("invalid hex"))?;
        Self::new(key_type, &bytes, version)
    }

    /// Key family
    pub const fn key_type(&self) -> KeyType {
        self.cipher_suite.key_type()
    }

    /// Cipher suite
    pub const fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    /// Cipher block size in bytes
    pub const fn block_size(&self) -> usize {
        self.cipher_suite.block_size()
    }

    /// Key version
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// Key bytes as stored on a card; single DES keys are doubled
    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Current CBC IV
    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    /// Reset the CBC chain to an all-zero IV
    pub fn clear_iv(&mut self) {
        self.iv.iter_mut().for_each(|b| *b = 0);
    }

    /// Encrypt `data`, zero-padded to the block size, continuing the CBC chain
    pub fn encrypt(&mut self, data: &[u8]) -> Result<Bytes> {
        let block_size = self.block_size();
        let mut buf = data.to_vec();
        buf.resize(data.len().div_ceil(block_size) * block_size, 0);
        if buf.is_empty() {
            return Ok(Bytes::new());
        }

        self.cbc_encrypt(&self.iv.clone(), &mut buf)?;
        self.iv.copy_from_slice(&buf[buf.len() - block_size..]);
        Ok(buf.into())
    }

    /// Decrypt block-aligned `data`, continuing the CBC chain
    pub fn decrypt(&mut self, data: &[u8]) -> Result<Bytes> {
        let block_size = self.block_size();
        if data.len() % block_size != 0 {
            return Err(Error::InvalidArgument("ciphertext is not block aligned"));
        }
        if data.is_empty() {
            return Ok(Bytes::new());
        }

        let mut buf = data.to_vec();
        self.cbc_decrypt(&self.iv.clone(), &mut buf)?;
        self.iv.copy_from_slice(&data[data.len() - block_size..]);
        Ok(buf.into())
    }

    /// Derive the CMAC subkeys (NIST SP 800-38B) under a zero IV
    pub fn generate_cmac_subkeys(&mut self) -> Result<()> {
        let block_size = self.block_size();
        let rb = if block_size == 8 { RB_64 } else { RB_128 };

        let mut l = vec![0u8; block_size];
        self.cbc_encrypt(&vec![0u8; block_size], &mut l)?;

        self.subkey1 = shift_left_xor(&l, rb);
        self.subkey2 = shift_left_xor(&self.subkey1, rb);
        Ok(())
    }

    /// CMAC of `data` under the current CBC chain
    ///
    /// Returns the full block; DESFire transmits its first 8 bytes.
    pub fn calculate_cmac(&mut self, data: &[u8]) -> Result<Bytes> {
        let block_size = self.block_size();
        let mut buf = data.to_vec();

        let subkey = if buf.is_empty() || buf.len() % block_size != 0 {
            buf.push(0x80);
            buf.resize(buf.len().div_ceil(block_size) * block_size, 0);
            &self.subkey2
        } else {
            &self.subkey1
        };

        let offset = buf.len() - block_size;
        for (byte, k) in buf[offset..].iter_mut().zip(subkey) {
            *byte ^= k;
        }

        let encrypted = self.encrypt(&buf)?;
        Ok(encrypted.slice(encrypted.len() - block_size..))
    }

    fn cbc_encrypt(&self, iv: &[u8], buf: &mut [u8]) -> Result<()> {
        match self.cipher_suite {
            CipherSuite::Des => cbc_encrypt::<Des>(&self.key[..8], iv, buf),
            CipherSuite::TdesEde2 => cbc_encrypt::<TdesEde2>(&self.key, iv, buf),
            CipherSuite::TdesEde3 => cbc_encrypt::<TdesEde3>(&self.key, iv, buf),
            CipherSuite::Aes128 => cbc_encrypt::<aes::Aes128>(&self.key, iv, buf),
        }
    }

    fn cbc_decrypt(&self, iv: &[u8], buf: &mut [u8]) -> Result<()> {
        match self.cipher_suite {
            CipherSuite::Des => cbc_decrypt::<Des>(&self.key[..8], iv, buf),
            CipherSuite::TdesEde2 => cbc_decrypt::<TdesEde2>(&self.key, iv, buf),
            CipherSuite::TdesEde3 => cbc_decrypt::<TdesEde3>(&self.key, iv, buf),
            CipherSuite::Aes128 => cbc_decrypt::<aes::Aes128>(&self.key, iv, buf),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("cipher_suite", &self.cipher_suite)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "zeroize")]
impl Drop for Key {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
        self.subkey1.zeroize();
        self.subkey2.zeroize();
    }
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let len = buf.len();
    cbc::Encryptor::<C>::new_from_slices(key, iv)?
        .encrypt_padded_mut::<NoPadding>(buf, len)
        .map_err(|_| Error::InvalidArgument("data is not block aligned"))?;
    Ok(())
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    cbc::Decryptor::<C>::new_from_slices(key, iv)?
        .decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| Error::InvalidArgument("data is not block aligned"))?;
    Ok(())
}

/// Encode the key version into the LSB (parity) bit of the first 8 bytes
fn store_key_version(key: &[u8], version: u8) -> Vec<u8> {
    key.iter()
        .enumerate()
        .map(|(index, &byte)| {
            let parity = index < 8 && version & (0x80 >> index) != 0;
            (byte & 0xFE) | u8::from(parity)
        })
        .collect()
}

/// Whether both halves of a 16 byte DES key match, ignoring parity bits
fn same_halves(key: &[u8]) -> bool {
    let (first, second) = key.split_at(8);
    first.iter().zip(second).all(|(a, b)| a & 0xFE == b & 0xFE)
}

/// One-bit left shift of a block, XORing `rb` into the last byte on carry
fn shift_left_xor(block: &[u8], rb: u8) -> Vec<u8> {
    let mut shifted = vec![0u8; block.len()];
    let mut carry = 0;
    for (out, &byte) in shifted.iter_mut().zip(block).rev() {
        *out = (byte << 1) | carry;
        carry = byte >> 7;
    }
    if block[0] & 0x80 != 0 {
        if let Some(last) = shifted.last_mut() {
            *last ^= rb;
        }
    }
    shifted
}
