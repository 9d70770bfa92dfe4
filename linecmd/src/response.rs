//! Building and sending response lines.
//!
//! A response looks like
//!
//! ```text
//! ok 42 *3a5f
//! err unknown_command *9c1e
//! ```
//!
//! The CRC covers everything before the ` *`, and is always present.

use core::fmt::{self, Write as _};

use crate::crc::crc16;
use crate::{CHECKSUM_MARKER, DEFAULT_BUFFER_SIZE, SEPARATOR};

/// The reasons for a protocol-level `err` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reason {
    /// The incoming line did not fit in the line buffer.
    InBufferOverflow,
    /// A response did not fit in the transmit buffer.
    OutBufferOverflow,
    /// A response message failed to format.
    FormatError,
    /// The incoming line had a checksum, and it was wrong.
    CrcMismatch,
    /// No command matched the incoming line.
    UnknownCommand,
    /// The incoming line had too many arguments.
    ArgsOverflow,
    /// A command was registered into a full table.
    ConfigTooLong,
}

impl Reason {
    /// All reasons, in no particular order.
    pub const ALL: [Reason; 7] = [
        Reason::InBufferOverflow,
        Reason::OutBufferOverflow,
        Reason::FormatError,
        Reason::CrcMismatch,
        Reason::UnknownCommand,
        Reason::ArgsOverflow,
        Reason::ConfigTooLong,
    ];

    /// The reason as it appears on the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Reason::InBufferOverflow => "in_buffer_overflow",
            Reason::OutBufferOverflow => "out_buffer_overflow",
            Reason::FormatError => "format_error",
            Reason::CrcMismatch => "crc_mismatch",
            Reason::UnknownCommand => "unknown_command",
            Reason::ArgsOverflow => "args_overflow",
            Reason::ConfigTooLong => "config_too_long",
        }
    }

    /// Look up a reason from its wire name.
    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that can send a response line.
///
/// This is what command handlers get. Failures are handled inside: a
/// message that does not fit turns into `err out_buffer_overflow`, and
/// a failing [fmt::Display] turns into `err format_error`.
pub trait Respond {
    /// Send a response, with an optional message.
    fn respond(&mut self, success: bool, message: Option<fmt::Arguments<'_>>);

    /// Send a plain `ok`.
    fn respond_ok(&mut self) {
        self.respond(true, None)
    }

    /// Send `err` with a protocol error reason.
    fn respond_err(&mut self, reason: Reason) {
        self.respond(false, Some(format_args!("{}", reason.as_str())))
    }

    /// Send a response with a plain string message.
    fn respond_str(&mut self, success: bool, message: &str) {
        self.respond(success, Some(format_args!("{}", message)))
    }
}

impl<R> Respond for &mut R
where
    R: Respond + ?Sized,
{
    fn respond(&mut self, success: bool, message: Option<fmt::Arguments<'_>>) {
        (**self).respond(success, message)
    }
}

/// Why building a line failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BuildError {
    /// Ran out of room.
    Overflow,
    /// A [fmt::Display] impl returned an error.
    Format,
}

impl BuildError {
    /// The `err` reason to send instead.
    pub fn reason(&self) -> Reason {
        match self {
            BuildError::Overflow => Reason::OutBufferOverflow,
            BuildError::Format => Reason::FormatError,
        }
    }
}

/// A [fmt::Write] into a fixed slice that remembers if it ran out of room.
#[derive(Debug)]
pub struct SliceWriter<'a> {
    buffer: &'a mut [u8],
    len: usize,
    overflowed: bool,
}

impl<'a> SliceWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            len: 0,
            overflowed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Everything written so far.
    pub fn written(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), BuildError> {
        let end = self.len + bytes.len();
        if end > self.buffer.len() {
            self.overflowed = true;
            return Err(BuildError::Overflow);
        }
        self.buffer[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    /// Format into the buffer, and tell apart running out of room from
    /// a broken [fmt::Display].
    pub fn format(&mut self, args: fmt::Arguments<'_>) -> Result<(), BuildError> {
        self.overflowed = false;
        match self.write_fmt(args) {
            Ok(()) => Ok(()),
            Err(_) if self.overflowed => Err(BuildError::Overflow),
            Err(_) => Err(BuildError::Format),
        }
    }

    /// Append ` *<hex crc>` covering everything written so far, then
    /// `ending`.
    pub fn finish(&mut self, ending: &[u8]) -> Result<usize, BuildError> {
        let crc = crc16(self.written());
        self.write_bytes(&[SEPARATOR, CHECKSUM_MARKER])?;
        self.format(format_args!("{:x}", crc))?;
        self.write_bytes(ending)?;
        Ok(self.len)
    }
}

impl<'a> fmt::Write for SliceWriter<'a> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

/// Build a complete response line into `buffer`.
///
/// Returns the length of the line, including the trailing newline.
pub fn build(
    buffer: &mut [u8],
    success: bool,
    message: Option<fmt::Arguments<'_>>,
) -> Result<usize, BuildError> {
    let mut w = SliceWriter::new(buffer);
    let status: &[u8] = if success { b"ok" } else { b"err" };
    w.write_bytes(status)?;
    if let Some(message) = message {
        w.write_bytes(&[SEPARATOR])?;
        w.format(message)?;
    }
    w.finish(b"\n")
}

/// Sends response lines to a port, building each one in its own
/// transmit buffer first.
///
/// A line only goes out once it is complete. If building fails, the
/// attempt is thrown away and a diagnostic `err` line is built from
/// scratch in its place. If even that does not fit, nothing is sent.
///
/// Port errors can't go anywhere from inside [Respond::respond()], so
/// the first one is kept until [Responder::take_error()].
pub struct Responder<P, const SIZE: usize = DEFAULT_BUFFER_SIZE>
where
    P: embedded_io::ErrorType,
{
    port: P,
    buffer: [u8; SIZE],
    error: Option<P::Error>,
}

impl<P, const SIZE: usize> core::fmt::Debug for Responder<P, SIZE>
where
    P: embedded_io::ErrorType + core::fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Responder")
            .field("port", &self.port)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<P, const SIZE: usize> Responder<P, SIZE>
where
    P: embedded_io::ErrorType,
{
    pub const fn new(port: P) -> Self {
        Self {
            port,
            buffer: [0; SIZE],
            error: None,
        }
    }

    /// Release the port.
    pub fn free(self) -> P {
        self.port
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Take the first port error seen since the last call.
    pub fn take_error(&mut self) -> Option<P::Error> {
        self.error.take()
    }

    fn keep_error(&mut self, e: P::Error) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }

    /// Write raw bytes straight to the port, bypassing the buffer.
    pub fn write_raw(&mut self, bytes: &[u8])
    where
        P: embedded_io::Write,
    {
        if let Err(e) = self.port.write_all(bytes) {
            self.keep_error(e);
        }
    }
}

impl<P, const SIZE: usize> Respond for Responder<P, SIZE>
where
    P: embedded_io::Write,
{
    fn respond(&mut self, success: bool, message: Option<fmt::Arguments<'_>>) {
        let len = match build(&mut self.buffer, success, message) {
            Ok(len) => len,
            Err(e) => {
                let reason = e.reason();
                warn!("response failed, sending {}", reason);
                match build(&mut self.buffer, false, Some(format_args!("{}", reason))) {
                    Ok(len) => len,
                    Err(_) => {
                        warn!("no room for diagnostic response");
                        return;
                    }
                }
            }
        };

        let result = self
            .port
            .write_all(&self.buffer[..len])
            .and_then(|_| self.port.flush());
        if let Err(e) = result {
            self.keep_error(e);
        }
    }
}
