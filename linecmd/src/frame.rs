//! Checksum verification on incoming lines.
//!
//! A request line may end with a separator, a `*`, and a hex CRC:
//!
//! ```text
//! set 3 100 *8a1c
//! ```
//!
//! The CRC covers everything before the separator (`set 3 100`). This
//! is the same span the device covers on its own responses. A line with
//! no `*` at all is not checked.

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{hex_digit0, multispace0};
use nom::combinator::opt;
use nom::sequence::pair;
use nom::IResult;

use crate::crc::crc16;
use crate::{CHECKSUM_MARKER, SEPARATOR};

/// A line that failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// The provided CRC did not match. `provided` is [None] if the
    /// field was not representable as a 16-bit value.
    CrcMismatch {
        calculated: u16,
        provided: Option<u16>,
    },
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::CrcMismatch {
                calculated,
                provided: Some(provided),
            } => write!(
                f,
                "crc mismatch: calculated {:04x}, provided {:04x}",
                calculated, provided
            ),
            Self::CrcMismatch {
                calculated,
                provided: None,
            } => write!(f, "crc mismatch: calculated {:04x}, provided garbage", calculated),
        }
    }
}

/// A line split at its checksum marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Split<'a> {
    /// The part covered by the CRC.
    pub body: &'a [u8],
    /// Everything after the marker.
    pub digits: &'a [u8],
}

/// Split a line at the first checksum marker, if there is one.
///
/// One separator immediately before the marker is dropped from the body.
/// A marker with no separator before it is accepted too, and then nothing
/// is dropped: `ping*<crc of "ping">` verifies.
pub fn split(line: &[u8]) -> Option<Split<'_>> {
    let marker = line.iter().position(|b| *b == CHECKSUM_MARKER)?;
    let body = &line[..marker];
    let body = body.strip_suffix(&[SEPARATOR]).unwrap_or(body);
    Some(Split {
        body,
        digits: &line[marker + 1..],
    })
}

fn hex_prefix(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let prefix: IResult<&[u8], _> = pair(multispace0, opt(alt((tag("0x"), tag("0X")))))(input);
    let (input, _) = prefix?;
    hex_digit0(input)
}

/// Read a hex number from the front of `digits`, the way `strtoul`
/// would: skip leading whitespace and an optional `0x`, then read hex
/// digits until the first non-hex byte. No digits at all reads as 0.
///
/// Returns [None] if the number does not fit in 16 bits.
pub fn parse_hex(digits: &[u8]) -> Option<u16> {
    let hex = match hex_prefix(digits) {
        Ok((_, hex)) => hex,
        Err(_) => return Some(0),
    };

    let mut value: u16 = 0;
    for b in hex {
        // hex_digit0 only hands back hex digits
        let digit = (*b as char).to_digit(16)? as u16;
        value = value.checked_mul(16)?.checked_add(digit)?;
    }
    Some(value)
}

/// Verify the checksum on a line, if present.
///
/// Returns the part of the line before the checksum, or the whole line
/// if there is no checksum.
pub fn verify(line: &[u8]) -> Result<&[u8], FrameError> {
    let Some(split) = split(line) else {
        return Ok(line);
    };

    let calculated = crc16(split.body);
    let provided = parse_hex(split.digits);
    if provided != Some(calculated) {
        return Err(FrameError::CrcMismatch {
            calculated,
            provided,
        });
    }

    Ok(split.body)
}

#[cfg(test)]
mod test {
    use super::*;

    use quickcheck_macros::quickcheck;

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut line = body.to_vec();
        line.extend_from_slice(format!(" *{:x}", crc16(body)).as_bytes());
        line
    }

    #[test]
    fn no_checksum() {
        assert_eq!(verify(b"ping"), Ok(b"ping".as_ref()));
        assert_eq!(verify(b""), Ok(b"".as_ref()));
    }

    #[test]
    fn good_checksum() {
        let line = with_crc(b"ping");
        assert_eq!(verify(&line), Ok(b"ping".as_ref()));
    }

    #[test]
    fn good_checksum_uppercase() {
        let line = format!("ping *{:X}", crc16(b"ping"));
        assert_eq!(verify(line.as_bytes()), Ok(b"ping".as_ref()));
    }

    #[test]
    fn good_checksum_with_args() {
        let line = with_crc(b"set 3 100");
        assert_eq!(verify(&line), Ok(b"set 3 100".as_ref()));
    }

    #[test]
    fn bad_checksum() {
        let mut line = with_crc(b"ping");
        let last = line.len() - 1;
        line[last] = if line[last] == b'0' { b'1' } else { b'0' };
        assert!(matches!(
            verify(&line),
            Err(FrameError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn no_separator() {
        let line = format!("ping*{:x}", crc16(b"ping"));
        assert_eq!(verify(line.as_bytes()), Ok(b"ping".as_ref()));

        // only a separator is dropped, never the last byte of the body
        let line = format!("ping*{:x}", crc16(b"pin"));
        assert!(verify(line.as_bytes()).is_err());

        // exactly one separator is dropped
        let line = format!("ping  *{:x}", crc16(b"ping "));
        assert_eq!(verify(line.as_bytes()), Ok(b"ping ".as_ref()));
    }

    #[test]
    fn only_marker() {
        // no digits reads as zero, which never matches the empty crc
        assert_eq!(
            verify(b"*"),
            Err(FrameError::CrcMismatch {
                calculated: 0xffff,
                provided: Some(0),
            })
        );
        assert_eq!(verify(b"*ffff"), Ok(b"".as_ref()));
    }

    #[test]
    fn split_first_marker() {
        assert_eq!(
            split(b"a *b *c"),
            Some(Split {
                body: b"a",
                digits: b"b *c",
            })
        );
    }

    #[test]
    fn hex_like_strtoul() {
        assert_eq!(parse_hex(b"1a2B"), Some(0x1a2b));
        assert_eq!(parse_hex(b"  ff"), Some(0xff));
        assert_eq!(parse_hex(b"0x10"), Some(0x10));
        assert_eq!(parse_hex(b"12zz"), Some(0x12));
        assert_eq!(parse_hex(b""), Some(0));
        assert_eq!(parse_hex(b"xyz"), Some(0));
        assert_eq!(parse_hex(b"ffff"), Some(0xffff));
        assert_eq!(parse_hex(b"10000"), None);
    }

    #[quickcheck]
    fn checksummed_lines_verify(body: Vec<u8>) -> bool {
        let body: Vec<u8> = body.into_iter().filter(|b| *b != b'*').collect();
        let line = with_crc(&body);
        verify(&line) == Ok(&body[..])
    }
}
