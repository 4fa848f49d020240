//! Little-endian integer encoding for card command fields
//!
//! Card commands carry offsets, lengths and values as fixed-width
//! little-endian integers of 1 to 8 bytes. Signed values use two's complement.

use bytes::{Buf, BufMut};

use crate::{Error, Result};

/// Widest integer field supported by the codec
pub const MAX_WIDTH: usize = 8;

const fn check_width(width: usize) -> Result<()> {
    if width == 0 || width > MAX_WIDTH {
        return Err(Error::invalid_argument("integer width must be 1 to 8 bytes"));
    }
    Ok(())
}

/// Append `value` as an unsigned little-endian integer of `width` bytes
pub fn encode_uint<B: BufMut>(buf: &mut B, value: u64, width: usize) -> Result<()> {
    check_width(width)?;
    if width < MAX_WIDTH && value >> (width * 8) != 0 {
        return Err(Error::invalid_argument("value does not fit the field width"));
    }
    buf.put_uint_le(value, width);
    Ok(())
}

/// Append `value` as a two's-complement little-endian integer of `width` bytes
pub fn encode_sint<B: BufMut>(buf: &mut B, value: i64, width: usize) -> Result<()> {
    check_width(width)?;
    if width < MAX_WIDTH {
        let bound = 1i64 << (width * 8 - 1);
        if value < -bound || value >= bound {
            return Err(Error::invalid_argument("value does not fit the field width"));
        }
    }
    buf.put_int_le(value, width);
    Ok(())
}

/// Decode all of `data` as an unsigned little-endian integer
pub fn decode_uint(mut data: &[u8]) -> Result<u64> {
    check_width(data.len())?;
    let width = data.len();
    Ok(data.get_uint_le(width))
}

/// Decode all of `data` as a two's-complement little-endian integer
pub fn decode_sint(data: &[u8]) -> Result<i64> {
    let raw = decode_uint(data)?;
    let shift = 64 - data.len() * 8;
    Ok(((raw << shift) as i64) >> shift)
}
