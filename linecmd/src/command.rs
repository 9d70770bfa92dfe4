//! Command names, handlers, and the table that holds them.

use crate::response::Respond;
use crate::tokenize::Args;

/// Max size of a command name, in bytes.
pub const NAME_SIZE: usize = 16;

/// A command handler.
///
/// Handlers get the context passed to [crate::Engine::poll()], a way to
/// respond, and the arguments after the command name. They are expected
/// to respond exactly once.
pub type Handler<C> = fn(&mut C, &mut dyn Respond, Args<'_>);

/// A bounded command name.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Default)]
pub struct CommandName {
    len: u8,
    data: [u8; NAME_SIZE],
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NameError {
    Empty,
    TooLong,
}

#[cfg(feature = "std")]
impl std::error::Error for NameError {}

impl core::fmt::Display for NameError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            NameError::Empty => write!(f, "command name must not be empty"),
            NameError::TooLong => {
                write!(f, "command name must be {} bytes or less", NAME_SIZE)
            }
        }
    }
}

impl CommandName {
    pub const fn new_from_str(name: &str) -> Result<Self, NameError> {
        Self::new_from_bytes(name.as_bytes())
    }

    pub const fn new_from_bytes(bytes: &[u8]) -> Result<Self, NameError> {
        if bytes.is_empty() {
            return Err(NameError::Empty);
        }
        if bytes.len() > NAME_SIZE {
            return Err(NameError::TooLong);
        }

        let mut data = [0; NAME_SIZE];
        let mut i = 0;
        while i < bytes.len() {
            data[i] = bytes[i];
            i += 1;
        }

        Ok(Self {
            len: bytes.len() as u8,
            data,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn as_str(&self) -> Result<&str, core::str::Utf8Error> {
        core::str::from_utf8(self.as_bytes())
    }

    /// Does this line start with this name?
    pub fn is_prefix_of(&self, line: &[u8]) -> bool {
        line.starts_with(self.as_bytes())
    }
}

impl core::fmt::Debug for CommandName {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> Result<(), core::fmt::Error> {
        match self.as_str() {
            Ok(s) => f.debug_tuple("CommandName").field(&s).finish(),
            Err(_) => f.debug_tuple("CommandName").field(&self.as_bytes()).finish(),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CommandName {
    fn format(&self, f: defmt::Formatter) {
        match self.as_str() {
            Ok(s) => defmt::write!(f, "CommandName({})", s),
            Err(_) => defmt::write!(f, "CommandName({})", self.as_bytes()),
        }
    }
}

impl core::ops::Deref for CommandName {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.as_bytes()
    }
}

/// A command table entry.
pub struct Command<C> {
    name: CommandName,
    handler: Handler<C>,
}

// derive would require C: Clone
impl<C> Clone for Command<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Command<C> {}

impl<C> core::fmt::Debug for Command<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<C> Command<C> {
    /// Create a command, for use in a `static` table.
    ///
    /// Panics if the name is empty or too long. In a `static` or `const`,
    /// that is a compile error.
    pub const fn new(name: &str, handler: Handler<C>) -> Self {
        match CommandName::new_from_str(name) {
            Ok(name) => Self { name, handler },
            Err(NameError::Empty) => panic!("command name is empty"),
            Err(NameError::TooLong) => panic!("command name is too long"),
        }
    }

    pub const fn try_new(name: &str, handler: Handler<C>) -> Result<Self, NameError> {
        match CommandName::new_from_str(name) {
            Ok(name) => Ok(Self { name, handler }),
            Err(e) => Err(e),
        }
    }

    pub fn name(&self) -> &CommandName {
        &self.name
    }

    pub fn handler(&self) -> Handler<C> {
        self.handler
    }
}

/// Why a command could not be added to a [CommandTable].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TableError {
    /// Every slot is taken.
    Full,
    /// This table was built from a fixed list.
    Static,
}

#[cfg(feature = "std")]
impl std::error::Error for TableError {}

impl core::fmt::Display for TableError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            TableError::Full => write!(f, "command table is full"),
            TableError::Static => write!(f, "command table is static"),
        }
    }
}

/// An ordered, fixed-capacity list of commands.
///
/// Lookup is by prefix, and the first command in table order whose name
/// starts the line wins. If both `get` and `getall` are present, whichever
/// comes first handles `getall`.
#[derive(Debug, Clone)]
pub enum CommandTable<'a, C, const SIZE: usize> {
    /// A fixed list, never modified.
    Static(&'a [Command<C>]),
    /// Commands added one by one with [CommandTable::register()].
    Registered {
        entries: [Option<Command<C>>; SIZE],
        len: usize,
    },
}

impl<'a, C, const SIZE: usize> CommandTable<'a, C, SIZE> {
    /// An empty table for use with [Self::register()].
    pub fn new() -> Self {
        Self::Registered {
            entries: [None; SIZE],
            len: 0,
        }
    }

    /// A table using a fixed list of commands.
    pub const fn new_static(commands: &'a [Command<C>]) -> Self {
        Self::Static(commands)
    }

    /// Append a command.
    pub fn register(&mut self, command: Command<C>) -> Result<(), TableError> {
        match self {
            Self::Static(_) => Err(TableError::Static),
            Self::Registered { entries, len } => {
                let slot = entries.get_mut(*len).ok_or(TableError::Full)?;
                *slot = Some(command);
                *len += 1;
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Static(commands) => commands.len(),
            Self::Registered { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over commands in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Command<C>> {
        let (fixed, registered): (&[Command<C>], &[Option<Command<C>>]) = match self {
            Self::Static(commands) => (*commands, &[][..]),
            Self::Registered { entries, len } => (&[][..], &entries[..*len]),
        };
        fixed.iter().chain(registered.iter().flatten())
    }

    /// Find the first command that is a prefix of `line`.
    pub fn find(&self, line: &[u8]) -> Option<&Command<C>> {
        self.iter().find(|c| c.name.is_prefix_of(line))
    }
}

impl<'a, C, const SIZE: usize> Default for CommandTable<'a, C, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}
