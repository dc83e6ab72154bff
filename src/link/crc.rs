//! CRC-16 over frame payloads.
//!
//! Polynomial 0x1021, MSB-first, initial value 0xFFFF, no final XOR.
//! Table-driven: `crc = (crc << 8) ^ TABLE[(crc >> 8) ^ byte]`. The peer
//! runs the same table, so this must stay bit-exact.

const POLY: u16 = 0x1021;

/// Byte-indexed lookup table, built at compile time.
static TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the link CRC over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |crc, &byte| {
        let idx = ((crc >> 8) ^ byte as u16) & 0xFF;
        (crc << 8) ^ TABLE[idx as usize]
    })
}
