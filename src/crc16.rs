//! CRC-16/CCITT-FALSE.
//!
//! Polynomial 0x1021, initial value 0xFFFF, no reflection, no final XOR.
//! Bit-at-a-time so it can be folded one byte at a time while a script
//! streams in.

use crate::config::{CRC16_INIT, CRC16_POLY};

pub const fn init() -> u16 {
    CRC16_INIT
}

/// Fold one byte into the register, MSB first.
pub const fn update(crc: u16, byte: u8) -> u16 {
    let mut crc = crc ^ ((byte as u16) << 8);
    let mut bit = 0;
    while bit < 8 {
        crc = if crc & 0x8000 != 0 {
            (crc << 1) ^ CRC16_POLY
        } else {
            crc << 1
        };
        bit += 1;
    }
    crc
}

/// No final XOR for this variant.
pub const fn finalize(crc: u16) -> u16 {
    crc
}

/// One-shot checksum of a byte slice.
pub fn checksum(data: &[u8]) -> u16 {
    finalize(data.iter().fold(init(), |crc, &byte| update(crc, byte)))
}
