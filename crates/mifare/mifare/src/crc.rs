//! DESFire CRC32
//!
//! Reflected CRC32 with polynomial 0xEDB88320 and initial value 0xFFFFFFFF,
//! without the final XOR of IEEE 802.3. Appended to frames little-endian.

const POLYNOMIAL: u32 = 0xEDB8_8320;

/// CRC32 over the concatenation of `parts`
pub fn crc32(parts: &[&[u8]]) -> u32 {
    let mut crc = 0xFFFF_FFFF;
    for part in parts {
        for &byte in *part {
            crc ^= u32::from(byte);
            for _ in 0..8 {
                let lsb = crc & 1;
                crc >>= 1;
                if lsb != 0 {
                    crc ^= POLYNOMIAL;
                }
            }
        }
    }
    crc
}
