//! Splitting command arguments.

use crate::{CHECKSUM_MARKER, SEPARATOR};

/// Too many arguments for the argument slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArgsOverflow;

/// Split `text` into separator-delimited tokens, storing them in `slots`.
///
/// Runs of separators count as one. Tokenizing stops before a token
/// starting with the checksum marker. All slots are reset first, even on
/// failure.
///
/// Returns the number of tokens found.
pub fn tokenize<'a>(text: &'a [u8], slots: &mut [&'a [u8]]) -> Result<usize, ArgsOverflow> {
    for slot in slots.iter_mut() {
        *slot = &[];
    }

    let mut count = 0;
    for token in text.split(|b| *b == SEPARATOR).filter(|t| !t.is_empty()) {
        if token[0] == CHECKSUM_MARKER {
            break;
        }

        let slot = slots.get_mut(count).ok_or(ArgsOverflow)?;
        *slot = token;
        count += 1;
    }

    Ok(count)
}

/// Arguments handed to a command handler.
///
/// These borrow the engine's line buffer, and so only live as long as
/// the handler call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Args<'a> {
    argv: &'a [&'a [u8]],
}

impl<'a> Args<'a> {
    pub const fn new(argv: &'a [&'a [u8]]) -> Self {
        Self { argv }
    }

    /// The argument count.
    pub const fn len(&self) -> usize {
        self.argv.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// Get an argument as raw bytes.
    pub fn get(&self, i: usize) -> Option<&'a [u8]> {
        self.argv.get(i).copied()
    }

    /// Get an argument as a string, if it is valid UTF-8.
    pub fn str(&self, i: usize) -> Option<&'a str> {
        core::str::from_utf8(self.get(i)?).ok()
    }

    /// Parse an argument with [core::str::FromStr].
    pub fn parse<T>(&self, i: usize) -> Option<T>
    where
        T: core::str::FromStr,
    {
        self.str(i)?.parse().ok()
    }

    pub fn as_slice(&self) -> &'a [&'a [u8]] {
        self.argv
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.argv.iter().copied()
    }
}
