//! The host side of the protocol: building requests and reading
//! responses.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while_m_n};
use nom::combinator::all_consuming;
use nom::IResult;

use crate::crc::crc16;
use crate::response::{Reason, SliceWriter};
use crate::{CHECKSUM_MARKER, DELIMITERS, SEPARATOR};

/// Why a request could not be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// The line contains a byte that would break framing.
    Forbidden(u8),
    /// The output buffer is too small.
    Overflow,
}

#[cfg(feature = "std")]
impl std::error::Error for EncodeError {}

impl core::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Forbidden(b) => write!(f, "request contains forbidden byte {:?}", *b as char),
            Self::Overflow => write!(f, "request too long"),
        }
    }
}

/// Encode a request line, with checksum and newline, into `out`.
///
/// Returns the number of bytes used.
pub fn encode_request(line: &str, out: &mut [u8]) -> Result<usize, EncodeError> {
    if let Some(b) = line
        .bytes()
        .find(|b| *b == CHECKSUM_MARKER || DELIMITERS.contains(b))
    {
        return Err(EncodeError::Forbidden(b));
    }

    let mut w = SliceWriter::new(out);
    w.write_bytes(line.as_bytes())
        .and_then(|_| w.finish(b"\n"))
        .map_err(|_| EncodeError::Overflow)
}

/// Why a response line could not be understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseError {
    /// No ` *` checksum field.
    MissingChecksum,
    /// The checksum field is not 1 to 4 hex digits.
    BadChecksumField,
    /// The checksum does not match.
    CrcMismatch { calculated: u16, provided: u16 },
    /// The line doesn't start with `ok` or `err`.
    BadStatus,
    /// The message is not UTF-8.
    Utf8,
}

#[cfg(feature = "std")]
impl std::error::Error for ResponseError {}

impl core::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::MissingChecksum => write!(f, "response has no checksum"),
            Self::BadChecksumField => write!(f, "response checksum is not hex"),
            Self::CrcMismatch {
                calculated,
                provided,
            } => write!(
                f,
                "response crc mismatch: calculated {:04x}, provided {:04x}",
                calculated, provided
            ),
            Self::BadStatus => write!(f, "response is not ok or err"),
            Self::Utf8 => write!(f, "response is not utf-8"),
        }
    }
}

/// A parsed response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Response<'a> {
    pub success: bool,
    pub message: Option<&'a str>,
    pub crc: u16,
}

fn status(input: &[u8]) -> IResult<&[u8], bool> {
    let (rest, word) = alt((tag("ok"), tag("err")))(input)?;
    Ok((rest, word == b"ok"))
}

fn checksum_field(input: &[u8]) -> IResult<&[u8], &[u8]> {
    all_consuming(take_while_m_n(1, 4, |b: u8| b.is_ascii_hexdigit()))(input)
}

impl<'a> Response<'a> {
    /// Parse a response line, without its newline.
    ///
    /// Messages may contain `*`, so the checksum is found from the end.
    pub fn parse(line: &'a [u8]) -> Result<Self, ResponseError> {
        let marker = line
            .windows(2)
            .rposition(|w| w == [SEPARATOR, CHECKSUM_MARKER])
            .ok_or(ResponseError::MissingChecksum)?;
        let body = &line[..marker];

        let (_, digits) =
            checksum_field(&line[marker + 2..]).map_err(|_| ResponseError::BadChecksumField)?;
        let mut provided: u16 = 0;
        for d in digits {
            // at most 4 digits, cannot overflow
            provided = provided * 16 + (*d as char).to_digit(16).unwrap_or(0) as u16;
        }

        let calculated = crc16(body);
        if calculated != provided {
            return Err(ResponseError::CrcMismatch {
                calculated,
                provided,
            });
        }

        let (rest, success) = status(body).map_err(|_| ResponseError::BadStatus)?;
        let message = match rest {
            [] => None,
            [SEPARATOR, message @ ..] => {
                Some(core::str::from_utf8(message).map_err(|_| ResponseError::Utf8)?)
            }
            _ => return Err(ResponseError::BadStatus),
        };

        Ok(Self {
            success,
            message,
            crc: provided,
        })
    }

    /// If this is a protocol error from the engine itself, which one.
    pub fn reason(&self) -> Option<Reason> {
        if self.success {
            return None;
        }
        Reason::from_name(self.message?)
    }
}

/// An error type for [Client].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientError<E> {
    /// EOF in underlying stream.
    UnexpectedEof,
    /// A line longer than the client buffer.
    Overflow,
    /// The request could not be encoded.
    Encode(EncodeError),
    /// The response could not be parsed.
    Response(ResponseError),
    /// Other IO error in underlying stream.
    Io(E),
}

#[cfg(feature = "std")]
impl<E> std::error::Error for ClientError<E> where E: core::fmt::Debug {}

impl<E> core::fmt::Display for ClientError<E>
where
    E: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected eof"),
            Self::Overflow => write!(f, "line too long"),
            Self::Encode(e) => write!(f, "{}", e),
            Self::Response(e) => write!(f, "{}", e),
            Self::Io(e) => write!(f, "io error: {:?}", e),
        }
    }
}

impl<E> From<E> for ClientError<E> {
    fn from(other: E) -> Self {
        Self::Io(other)
    }
}

/// A host-sided client.
///
/// Sends checksummed requests and reads back responses, one line at a
/// time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Client<F, const SIZE: usize = 128> {
    port: F,
    len: usize,
    skip: Option<usize>,
    buffer: [u8; SIZE],
}

/// A host-sided client using an [std::io] port.
#[cfg(feature = "std")]
pub type ClientStd<F, const SIZE: usize = 128> = Client<crate::FromStd<F>, SIZE>;

impl<F, const SIZE: usize> Client<F, SIZE> {
    pub fn new(port: F) -> Self {
        Self {
            port,
            len: 0,
            skip: None,
            buffer: [0u8; SIZE],
        }
    }

    /// Release the port.
    pub fn free(self) -> F {
        self.port
    }

    /// Get the underlying port.
    pub fn port(&self) -> &F {
        &self.port
    }

    /// Get the underlying port, mutably.
    ///
    /// Reading from this may cause you to miss responses.
    pub fn port_mut(&mut self) -> &mut F {
        &mut self.port
    }

    /// Encode and send a request.
    pub fn send(&mut self, line: &str) -> Result<(), ClientError<F::Error>>
    where
        F: embedded_io::Write,
    {
        let mut out = [0u8; SIZE];
        let len = encode_request(line, &mut out).map_err(ClientError::Encode)?;
        self.port.write_all(&out[..len])?;
        self.port.flush()?;
        Ok(())
    }

    // read until there's a whole line at the front of the buffer, and
    // return its length without delimiters
    fn next_line(&mut self) -> Result<usize, ClientError<F::Error>>
    where
        F: embedded_io::Read,
    {
        // drop the line handed out last time
        if let Some(skip) = self.skip.take() {
            self.buffer.copy_within(skip..self.len, 0);
            self.len -= skip.min(self.len);
        }

        loop {
            if let Some(end) = self.buffer[..self.len].iter().position(|b| *b == b'\n') {
                self.skip = Some(end + 1);
                let line = &self.buffer[..end];
                return Ok(line.strip_suffix(b"\r").unwrap_or(line).len());
            }

            if self.len >= SIZE {
                self.len = 0;
                return Err(ClientError::Overflow);
            }

            let amt = self.port.read(&mut self.buffer[self.len..])?;
            if amt == 0 {
                return Err(ClientError::UnexpectedEof);
            }
            self.len += amt;
        }
    }

    /// Read one raw line, without its line ending.
    pub fn read_line(&mut self) -> Result<&[u8], ClientError<F::Error>>
    where
        F: embedded_io::Read,
    {
        let len = self.next_line()?;
        Ok(&self.buffer[..len])
    }

    /// Read the next response, skipping blank lines.
    pub fn read_response(&mut self) -> Result<Response<'_>, ClientError<F::Error>>
    where
        F: embedded_io::Read,
    {
        self.read_response_skipping(None)
    }

    fn read_response_skipping(
        &mut self,
        mut echo: Option<&str>,
    ) -> Result<Response<'_>, ClientError<F::Error>>
    where
        F: embedded_io::Read,
    {
        let len = loop {
            let len = self.next_line()?;
            let line = &self.buffer[..len];
            if line.is_empty() {
                continue;
            }
            if let Some(e) = echo {
                // an echoing device sends the request back first
                if line.starts_with(e.as_bytes()) && Response::parse(line).is_err() {
                    echo = None;
                    continue;
                }
            }
            break len;
        };

        Response::parse(&self.buffer[..len]).map_err(ClientError::Response)
    }

    /// Send a request and wait for its response.
    ///
    /// If the device echoes, the echoed request is skipped.
    pub fn request(&mut self, line: &str) -> Result<Response<'_>, ClientError<F::Error>>
    where
        F: embedded_io::Read + embedded_io::Write,
    {
        self.send(line)?;
        self.read_response_skipping(Some(line))
    }
}
