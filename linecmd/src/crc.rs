//! The CRC used on both directions of the line protocol.

/// CRC-16/CCITT-FALSE: polynomial 0x1021, initial value 0xffff, no
/// reflection, no final xor. Also known as CRC-16/IBM-3740.
///
/// The 256-entry lookup table is computed at compile time.
pub static CRC16_CCITT: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);

/// Compute the CRC of a byte slice.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16_CCITT.checksum(data)
}

/// Start an incremental CRC, for data that isn't contiguous.
pub fn digest() -> crc::Digest<'static, u16> {
    CRC16_CCITT.digest()
}
