//! Modbus RTU CRC-16.
//!
//! Every RTU frame ends with a 16-bit checksum computed over all preceding bytes
//! and transmitted low byte first.

/// Reflected form of the CRC-16/MODBUS polynomial `x^16 + x^15 + x^2 + 1`.
pub const POLYNOMIAL: u16 = 0xA001;

/// Initial accumulator value.
pub const INIT: u16 = 0xFFFF;

/// Computes the Modbus CRC-16 over `bytes`.
///
/// The empty slice yields [`INIT`].
pub fn checksum(bytes: &[u8]) -> u16 {
    let mut crc = INIT;
    for byte in bytes {
        crc ^= *byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Appends the checksum of `frame` to itself, low byte first.
pub fn append(frame: &mut Vec<u8>) {
    let crc = checksum(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Reads the trailing checksum of a frame (low byte first).
///
/// Returns `None` for frames shorter than two bytes.
pub fn trailing(frame: &[u8]) -> Option<u16> {
    match frame {
        [.., lo, hi] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

/// Checks that the last two bytes of `frame` are the checksum of the rest.
pub fn verify(frame: &[u8]) -> bool {
    match trailing(frame) {
        Some(received) => checksum(&frame[..frame.len() - 2]) == received,
        None => false,
    }
}
