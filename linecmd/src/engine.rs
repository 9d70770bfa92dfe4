//! The device-side command engine.

use core::fmt;

use embedded_io::{Read, ReadReady, Write};

use crate::buffer::LineBuffer;
use crate::command::{Command, CommandTable, Handler, NameError, TableError};
use crate::frame;
use crate::response::{Reason, Respond, Responder};
use crate::tokenize::{tokenize, Args, ArgsOverflow};
use crate::{DEFAULT_ARGS_SIZE, DEFAULT_BUFFER_SIZE, DEFAULT_COMMANDS_SIZE};

/// An error type for [Engine].
///
/// Protocol problems are never returned here. They go to the peer as
/// `err` responses. This is only for the port itself failing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// EOF in underlying stream.
    UnexpectedEof,
    /// Other IO error in underlying stream.
    Io(E),
}

#[cfg(feature = "std")]
impl<E> std::error::Error for Error<E> where E: core::fmt::Debug {}

impl<E> core::fmt::Display for Error<E>
where
    E: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected eof"),
            Self::Io(e) => write!(f, "io error: {:?}", e),
        }
    }
}

impl<E> From<E> for Error<E> {
    fn from(other: E) -> Self {
        Self::Io(other)
    }
}

/// An error from [Engine::register()].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegisterError<E> {
    /// The command name is not usable.
    Name(NameError),
    /// The table is full. `err config_too_long` was sent.
    Full,
    /// The engine was built with a fixed command list.
    Static,
    /// The port failed while sending `err config_too_long`.
    Io(E),
}

#[cfg(feature = "std")]
impl<E> std::error::Error for RegisterError<E> where E: core::fmt::Debug {}

impl<E> core::fmt::Display for RegisterError<E>
where
    E: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Name(e) => write!(f, "{}", e),
            Self::Full => write!(f, "{}", TableError::Full),
            Self::Static => write!(f, "{}", TableError::Static),
            Self::Io(e) => write!(f, "io error: {:?}", e),
        }
    }
}

/// The command engine.
///
/// Reads request lines from a port, checks them, and hands them to
/// command handlers, which send responses back out the same port.
///
/// All sizes are fixed at compile time:
///
///  * `SIZE` is the line buffer capacity. Responses are built in a
///    second buffer of the same size.
///  * `ARGS` is the most arguments a command can take.
///  * `COMMANDS` is the capacity for [Engine::register()].
///  * `ECHO` sends every received byte straight back.
///
/// `C` is a context handed to each handler, from [Engine::poll()].
pub struct Engine<
    'a,
    C,
    P,
    const SIZE: usize = DEFAULT_BUFFER_SIZE,
    const ARGS: usize = DEFAULT_ARGS_SIZE,
    const COMMANDS: usize = DEFAULT_COMMANDS_SIZE,
    const ECHO: bool = false,
> where
    P: embedded_io::ErrorType,
{
    line: LineBuffer<SIZE>,
    commands: CommandTable<'a, C, COMMANDS>,
    responder: Responder<P, SIZE>,
}

impl<'a, C, P, const SIZE: usize, const ARGS: usize, const COMMANDS: usize, const ECHO: bool>
    Engine<'a, C, P, SIZE, ARGS, COMMANDS, ECHO>
where
    P: embedded_io::ErrorType,
{
    /// Create an engine with an empty command table, to be filled in
    /// with [Self::register()].
    pub fn new(port: P) -> Self {
        Self {
            line: LineBuffer::new(),
            commands: CommandTable::new(),
            responder: Responder::new(port),
        }
    }

    /// Create an engine with a fixed list of commands.
    pub fn with_commands(port: P, commands: &'a [Command<C>]) -> Self {
        Self {
            line: LineBuffer::new(),
            commands: CommandTable::new_static(commands),
            responder: Responder::new(port),
        }
    }

    /// Release the port.
    pub fn free(self) -> P {
        self.responder.free()
    }

    /// Get the underlying port.
    pub fn port(&self) -> &P {
        self.responder.port()
    }

    /// Get the underlying port, mutably.
    ///
    /// Reading from this will steal bytes out from under the engine.
    pub fn port_mut(&mut self) -> &mut P {
        self.responder.port_mut()
    }

    /// Get the command table.
    pub fn commands(&self) -> &CommandTable<'a, C, COMMANDS> {
        &self.commands
    }

    /// The partial line received so far.
    pub fn pending(&self) -> &[u8] {
        self.line.line(self.line.len())
    }

    fn take_error(&mut self) -> Result<(), Error<P::Error>> {
        match self.responder.take_error() {
            Some(e) => Err(Error::Io(e)),
            None => Ok(()),
        }
    }

    /// Add a command to the end of the table.
    ///
    /// If the table is full, this also sends `err config_too_long`.
    pub fn register(&mut self, name: &str, handler: Handler<C>) -> Result<(), RegisterError<P::Error>>
    where
        P: Write,
    {
        let command = Command::try_new(name, handler).map_err(RegisterError::Name)?;
        self.register_command(command)
    }

    /// Add an already-built command to the end of the table.
    pub fn register_command(
        &mut self,
        command: Command<C>,
    ) -> Result<(), RegisterError<P::Error>>
    where
        P: Write,
    {
        match self.commands.register(command) {
            Ok(()) => Ok(()),
            Err(TableError::Static) => Err(RegisterError::Static),
            Err(TableError::Full) => {
                warn!("command table full, dropping {}", command.name());
                self.responder.respond_err(Reason::ConfigTooLong);
                match self.responder.take_error() {
                    Some(e) => Err(RegisterError::Io(e)),
                    None => Err(RegisterError::Full),
                }
            }
        }
    }

    /// Send a response outside of a handler.
    pub fn respond(
        &mut self,
        success: bool,
        message: Option<fmt::Arguments<'_>>,
    ) -> Result<(), Error<P::Error>>
    where
        P: Write,
    {
        self.responder.respond(success, message);
        self.take_error()
    }

    /// Send a plain `ok` outside of a handler.
    pub fn respond_ok(&mut self) -> Result<(), Error<P::Error>>
    where
        P: Write,
    {
        self.respond(true, None)
    }

    /// Read and handle everything currently available on the port.
    ///
    /// Call this every time around your main loop. It never waits for
    /// more data, and may run any number of handlers before returning.
    pub fn poll(&mut self, ctx: &mut C) -> Result<(), Error<P::Error>>
    where
        P: Read + ReadReady + Write,
    {
        while self.responder.port_mut().read_ready()? {
            let mut byte = [0u8; 1];
            if self.responder.port_mut().read(&mut byte)? == 0 {
                return Err(Error::UnexpectedEof);
            }
            let byte = byte[0];

            // drop the partial line, but keep the byte that didn't fit
            if self.line.is_full() {
                warn!("line longer than {} bytes", SIZE);
                self.responder.respond_err(Reason::InBufferOverflow);
                self.line.clear();
            }

            let complete = self.line.push(byte);
            if ECHO {
                self.responder.write_raw(&[byte]);
            }

            if let Some(len) = complete {
                self.process_line(len, ctx);
                self.line.clear();
            }

            self.take_error()?;
        }

        Ok(())
    }

    fn process_line(&mut self, len: usize, ctx: &mut C)
    where
        P: Write,
    {
        let line = self.line.line(len);

        let body = match frame::verify(line) {
            Ok(body) => body,
            Err(e) => {
                warn!("{}", e);
                self.responder.respond_err(Reason::CrcMismatch);
                return;
            }
        };

        let Some(command) = self.commands.find(body) else {
            self.responder.respond_err(Reason::UnknownCommand);
            return;
        };

        let mut argv: [&[u8]; ARGS] = [&[]; ARGS];
        let argc = match tokenize(&body[command.name().as_bytes().len()..], &mut argv) {
            Ok(argc) => argc,
            Err(ArgsOverflow) => {
                self.responder.respond_err(Reason::ArgsOverflow);
                return;
            }
        };

        debug!("dispatch {} with {} args", command.name(), argc);
        let handler = command.handler();
        handler(ctx, &mut self.responder, Args::new(&argv[..argc]));
    }
}

impl<'a, C, P, const SIZE: usize, const ARGS: usize, const COMMANDS: usize, const ECHO: bool>
    core::fmt::Debug for Engine<'a, C, P, SIZE, ARGS, COMMANDS, ECHO>
where
    P: embedded_io::ErrorType + core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("line", &self.line)
            .field("commands", &self.commands.len())
            .field("responder", &self.responder)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crc::crc16;
    use crate::host::{encode_request, Response};
    use crate::respond;
    use crate::mock::MockPort;

    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    #[derive(Debug, Default)]
    struct Recorder {
        calls: Vec<(&'static str, Vec<Vec<u8>>)>,
    }

    impl Recorder {
        fn record(&mut self, name: &'static str, args: Args<'_>) {
            self.calls
                .push((name, args.iter().map(|a| a.to_vec()).collect()));
        }
    }

    fn ping(r: &mut Recorder, resp: &mut dyn Respond, args: Args<'_>) {
        r.record("ping", args);
        resp.respond_ok();
    }

    fn get(r: &mut Recorder, resp: &mut dyn Respond, args: Args<'_>) {
        r.record("get", args);
        respond!(resp, true, "{}", args.len());
    }

    fn getall(r: &mut Recorder, resp: &mut dyn Respond, args: Args<'_>) {
        r.record("getall", args);
        resp.respond_ok();
    }

    fn echo(r: &mut Recorder, resp: &mut dyn Respond, args: Args<'_>) {
        r.record("echo", args);
        match args.str(0) {
            Some(s) => resp.respond_str(true, s),
            None => resp.respond_str(false, "no_args"),
        }
    }

    fn big(r: &mut Recorder, resp: &mut dyn Respond, args: Args<'_>) {
        r.record("big", args);
        respond!(resp, true, "{:>40}", "right aligned");
    }

    fn silent(r: &mut Recorder, _resp: &mut dyn Respond, args: Args<'_>) {
        r.record("silent", args);
    }

    static COMMANDS: [Command<Recorder>; 6] = [
        Command::new("ping", ping),
        Command::new("get", get),
        Command::new("getall", getall),
        Command::new("echo", echo),
        Command::new("big", big),
        Command::new("silent", silent),
    ];

    type TestEngine = Engine<'static, Recorder, MockPort, 32, 3, 4>;

    fn engine() -> TestEngine {
        Engine::with_commands(MockPort::new(), &COMMANDS)
    }

    fn run<const COMMANDS: usize>(
        engine: &mut Engine<'static, Recorder, MockPort, 32, 3, COMMANDS>,
        rec: &mut Recorder,
        input: &[u8],
    ) -> Vec<String> {
        engine.port_mut().feed(input);
        engine.poll(rec).unwrap();
        engine.port_mut().take_lines()
    }

    fn ok(message: Option<&str>) -> String {
        match message {
            Some(m) => format!("ok {} *{:x}", m, crc16(format!("ok {}", m).as_bytes())),
            None => format!("ok *{:x}", crc16(b"ok")),
        }
    }

    fn err(reason: Reason) -> String {
        let body = format!("err {}", reason);
        format!("{} *{:x}", body, crc16(body.as_bytes()))
    }

    fn args(list: &[&str]) -> Vec<Vec<u8>> {
        list.iter().map(|a| a.as_bytes().to_vec()).collect()
    }

    #[test]
    fn ping_plain() {
        let mut e = engine();
        let mut rec = Recorder::default();
        assert_eq!(run(&mut e, &mut rec, b"ping\n"), vec![ok(None)]);
        assert_eq!(rec.calls, vec![("ping", vec![])]);
    }

    #[test]
    fn ping_checksummed() {
        let mut e = engine();
        let mut rec = Recorder::default();
        let line = format!("ping *{:x}\n", crc16(b"ping"));
        assert_eq!(run(&mut e, &mut rec, line.as_bytes()), vec![ok(None)]);
        assert_eq!(rec.calls.len(), 1);
    }

    #[test]
    fn ping_bad_checksum() {
        let mut e = engine();
        let mut rec = Recorder::default();
        let crc = crc16(b"ping");
        let line = format!("ping *{:x}\n", crc ^ 0x1);
        assert_eq!(
            run(&mut e, &mut rec, line.as_bytes()),
            vec![err(Reason::CrcMismatch)]
        );
        assert!(rec.calls.is_empty());
    }

    #[test]
    fn checksum_not_an_argument() {
        let mut e = engine();
        let mut rec = Recorder::default();
        let line = format!("echo a b c *{:x}\n", crc16(b"echo a b c"));
        assert_eq!(run(&mut e, &mut rec, line.as_bytes()), vec![ok(Some("a"))]);
        assert_eq!(rec.calls, vec![("echo", args(&["a", "b", "c"]))]);
    }

    #[test]
    fn first_registered_wins() {
        let mut e = engine();
        let mut rec = Recorder::default();
        assert_eq!(run(&mut e, &mut rec, b"getall x\n"), vec![ok(Some("2"))]);
        assert_eq!(rec.calls, vec![("get", args(&["all", "x"]))]);
    }

    #[test]
    fn registered_order_wins() {
        let mut e = Engine::<'static, Recorder, MockPort, 32, 3, 4>::new(MockPort::new());
        e.register("getall", getall).unwrap();
        e.register("get", get).unwrap();
        let mut rec = Recorder::default();
        assert_eq!(run(&mut e, &mut rec, b"getall x\n"), vec![ok(None)]);
        assert_eq!(rec.calls, vec![("getall", args(&["x"]))]);
    }

    #[test]
    fn unknown_command() {
        let mut e = engine();
        let mut rec = Recorder::default();
        assert_eq!(
            run(&mut e, &mut rec, b"reboot\n"),
            vec![err(Reason::UnknownCommand)]
        );
        assert!(rec.calls.is_empty());
    }

    #[test]
    fn empty_line_is_unknown() {
        let mut e = engine();
        let mut rec = Recorder::default();
        assert_eq!(run(&mut e, &mut rec, b"\n"), vec![err(Reason::UnknownCommand)]);
    }

    #[test]
    fn crlf_is_two_lines() {
        let mut e = engine();
        let mut rec = Recorder::default();
        assert_eq!(
            run(&mut e, &mut rec, b"ping\r\n"),
            vec![ok(None), err(Reason::UnknownCommand)]
        );
        assert_eq!(rec.calls.len(), 1);
    }

    #[test]
    fn cr_only() {
        let mut e = engine();
        let mut rec = Recorder::default();
        assert_eq!(run(&mut e, &mut rec, b"ping\r"), vec![ok(None)]);
    }

    #[test]
    fn args_overflow() {
        let mut e = engine();
        let mut rec = Recorder::default();
        assert_eq!(
            run(&mut e, &mut rec, b"echo a b c d\n"),
            vec![err(Reason::ArgsOverflow)]
        );
        assert!(rec.calls.is_empty());
    }

    #[test]
    fn args_exactly_full() {
        let mut e = engine();
        let mut rec = Recorder::default();
        assert_eq!(run(&mut e, &mut rec, b"echo a b c\n"), vec![ok(Some("a"))]);
        assert_eq!(rec.calls, vec![("echo", args(&["a", "b", "c"]))]);
    }

    #[test]
    fn input_overflow_recovers() {
        let mut e = engine();
        let mut rec = Recorder::default();
        let mut input = vec![b'a'; 40];
        input.extend_from_slice(b"\nping\n");
        // the tail of the long line arrives as its own line
        assert_eq!(
            run(&mut e, &mut rec, &input),
            vec![
                err(Reason::InBufferOverflow),
                err(Reason::UnknownCommand),
                ok(None)
            ]
        );
        assert_eq!(rec.calls, vec![("ping", vec![])]);
    }

    #[test]
    fn input_exactly_full() {
        let mut e = engine();
        let mut rec = Recorder::default();
        // 31 bytes of line, and the delimiter takes the last slot
        let mut input = b"echo ".to_vec();
        input.extend(vec![b'x'; 26]);
        input.push(b'\n');
        let lines = run(&mut e, &mut rec, &input);
        assert_eq!(lines.len(), 1);
        assert_eq!(rec.calls.len(), 1);
    }

    #[test]
    fn input_one_past_full() {
        let mut e = engine();
        let mut rec = Recorder::default();
        // 32 bytes of line leaves no room for the delimiter
        let mut input = b"echo ".to_vec();
        input.extend(vec![b'x'; 27]);
        input.push(b'\n');
        assert_eq!(
            run(&mut e, &mut rec, &input),
            vec![err(Reason::InBufferOverflow), err(Reason::UnknownCommand)]
        );
        assert!(rec.calls.is_empty());
    }

    #[test]
    fn output_overflow_recovers() {
        let mut e = engine();
        let mut rec = Recorder::default();
        assert_eq!(
            run(&mut e, &mut rec, b"big\nping\n"),
            vec![err(Reason::OutBufferOverflow), ok(None)]
        );
        assert_eq!(rec.calls.len(), 2);
    }

    #[test]
    fn silent_handler() {
        let mut e = engine();
        let mut rec = Recorder::default();
        assert_eq!(run(&mut e, &mut rec, b"silent\n"), Vec::<String>::new());
        assert_eq!(rec.calls.len(), 1);
    }

    #[test]
    fn many_lines_one_poll() {
        let mut e = engine();
        let mut rec = Recorder::default();
        assert_eq!(
            run(&mut e, &mut rec, b"ping\nget 1\nnope\n"),
            vec![ok(None), ok(Some("1")), err(Reason::UnknownCommand)]
        );
    }

    #[test]
    fn partial_line_waits() {
        let mut e = engine();
        let mut rec = Recorder::default();
        assert!(run(&mut e, &mut rec, b"pi").is_empty());
        assert_eq!(e.pending(), b"pi");
        assert_eq!(run(&mut e, &mut rec, b"ng\n"), vec![ok(None)]);
        assert!(e.pending().is_empty());
    }

    #[test]
    fn one_write_per_response() {
        let mut e = engine();
        let mut rec = Recorder::default();
        run(&mut e, &mut rec, b"ping\nget\n");
        assert_eq!(e.port().writes, 2);
    }

    #[test]
    fn echo_enabled() {
        let mut e =
            Engine::<'static, Recorder, MockPort, 32, 3, 4, true>::with_commands(MockPort::new(), &COMMANDS);
        let mut rec = Recorder::default();
        e.port_mut().feed(b"ping\n");
        e.poll(&mut rec).unwrap();
        assert_eq!(e.port_mut().take_lines(), vec!["ping".to_owned(), ok(None)]);
    }

    #[test]
    fn register_full() {
        let mut e = Engine::<'static, Recorder, MockPort, 32, 3, 2>::new(MockPort::new());
        assert_eq!(e.register("ping", ping), Ok(()));
        assert_eq!(e.register("get", get), Ok(()));
        assert_eq!(e.register("echo", echo), Err(RegisterError::Full));
        assert_eq!(e.port_mut().take_lines(), vec![err(Reason::ConfigTooLong)]);

        let mut rec = Recorder::default();
        assert_eq!(
            run(&mut e, &mut rec, b"echo hi\n"),
            vec![err(Reason::UnknownCommand)]
        );
    }

    #[test]
    fn register_bad_name() {
        let mut e = Engine::<'static, Recorder, MockPort, 32, 3, 2>::new(MockPort::new());
        assert_eq!(
            e.register("a_very_long_command_name", ping),
            Err(RegisterError::Name(NameError::TooLong))
        );
        assert_eq!(e.register("", ping), Err(RegisterError::Name(NameError::Empty)));
        assert!(e.port_mut().take_output().is_empty());
    }

    #[test]
    fn register_static() {
        let mut e = engine();
        assert_eq!(e.register("new", ping), Err(RegisterError::Static));
        assert!(e.port_mut().take_output().is_empty());
    }

    #[test]
    fn respond_outside_handler() {
        let mut e = engine();
        e.respond_ok().unwrap();
        e.respond(false, Some(format_args!("busy {}", 3))).unwrap();
        let lines = e.port_mut().take_lines();
        assert_eq!(lines[0], ok(None));
        assert_eq!(
            lines[1],
            format!("err busy 3 *{:x}", crc16(b"err busy 3"))
        );
    }

    #[test]
    fn host_round_trip() {
        let mut e = engine();
        let mut rec = Recorder::default();
        let mut request = [0u8; 32];
        let len = encode_request("echo hello", &mut request).unwrap();

        e.port_mut().feed(&request[..len]);
        e.poll(&mut rec).unwrap();
        let out = e.port_mut().take_output();
        let resp = Response::parse(out.strip_suffix(b"\n").unwrap()).unwrap();
        assert!(resp.success);
        assert_eq!(resp.message, Some("hello"));
    }

    #[test]
    fn eof() {
        struct Eof;
        impl embedded_io::ErrorType for Eof {
            type Error = core::convert::Infallible;
        }
        impl embedded_io::Read for Eof {
            fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> {
                Ok(0)
            }
        }
        impl embedded_io::ReadReady for Eof {
            fn read_ready(&mut self) -> Result<bool, Self::Error> {
                Ok(true)
            }
        }
        impl embedded_io::Write for Eof {
            fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
                Ok(buf.len())
            }

            fn flush(&mut self) -> Result<(), Self::Error> {
                Ok(())
            }
        }

        let mut e = Engine::<'static, Recorder, Eof>::with_commands(Eof, &COMMANDS);
        assert_eq!(e.poll(&mut Recorder::default()), Err(Error::UnexpectedEof));
    }

    #[quickcheck]
    fn byte_at_a_time(words: Vec<String>) -> TestResult {
        let words: Vec<String> = words
            .into_iter()
            .map(|w| {
                w.chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .take(4)
                    .collect::<String>()
            })
            .filter(|w| !w.is_empty())
            .take(3)
            .collect();

        let mut line = "echo".to_owned();
        for w in words.iter() {
            line.push(' ');
            line.push_str(w);
        }
        line.push('\n');

        let mut e = engine();
        let mut rec = Recorder::default();
        for b in line.bytes() {
            e.port_mut().feed(&[b]);
            if e.poll(&mut rec).is_err() {
                return TestResult::failed();
            }
        }

        let expected: Vec<Vec<u8>> = words.iter().map(|w| w.as_bytes().to_vec()).collect();
        TestResult::from_bool(rec.calls == vec![("echo", expected)])
    }
}
