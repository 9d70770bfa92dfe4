//! A line-framed, CRC-checked text command protocol for small devices.
//!
//! The device side is [Engine]: feed it a byte channel, register some
//! [Command]s, and call [Engine::poll()] from your main loop. The host
//! side lives in [host].

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[macro_use]
mod log;

pub mod buffer;
pub mod command;
pub mod crc;
pub mod engine;
pub mod frame;
pub mod host;
pub mod response;
pub mod tokenize;

#[cfg(feature = "std")]
mod port;
#[cfg(feature = "std")]
pub use port::*;

#[cfg(test)]
mod mock;

pub use command::{Command, CommandName, Handler, NAME_SIZE};
pub use engine::{Engine, Error};
pub use response::{Reason, Respond};
pub use tokenize::Args;

/// Re-export to allow using [host::Client] with [std::io] streams.
#[cfg(feature = "std")]
pub use embedded_io_adapters::std::FromStd;

/// Line delimiters. Either one ends a line.
pub const DELIMITERS: [u8; 2] = [b'\r', b'\n'];

/// Marks the start of the hex checksum at the end of a line.
pub const CHECKSUM_MARKER: u8 = b'*';

/// Separates the command name and arguments.
pub const SEPARATOR: u8 = b' ';

/// Default line buffer capacity, in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 32;

/// Default maximum number of arguments per command.
pub const DEFAULT_ARGS_SIZE: usize = 5;

/// Default maximum number of registered commands.
pub const DEFAULT_COMMANDS_SIZE: usize = 16;

/// Write a response with a formatted message.
///
/// ```ignore
/// respond!(resp, true);
/// respond!(resp, false, "bad_register {}", index);
/// ```
#[macro_export]
macro_rules! respond {
    ($resp:expr, $success:expr) => {{
        use $crate::Respond as _;
        ($resp).respond($success, None)
    }};
    ($resp:expr, $success:expr, $($arg:tt)+) => {{
        use $crate::Respond as _;
        ($resp).respond($success, Some(format_args!($($arg)+)))
    }};
}
