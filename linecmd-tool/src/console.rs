use std::io::{Read, Write};

use rustyline::{error::ReadlineError, DefaultEditor, ExternalPrinter};

use linecmd::host::{ClientStd, Response, ResponseError};

#[derive(clap::Args, Debug)]
pub struct ConsoleOpts {
    #[command(flatten)]
    port: crate::common::SerialPortArgs,
    #[command(flatten)]
    debug: crate::debug::DebugArgs,
}

impl crate::ToolRun for ConsoleOpts {
    fn run(&self) -> anyhow::Result<()> {
        let port = self.debug.wrap(self.port.open()?);
        Console::new(port).run()
    }
}

pub trait ConsoleTryClone: Sized {
    fn try_clone(&self) -> Option<Self>;
}

impl ConsoleTryClone for Box<dyn serialport::SerialPort> {
    fn try_clone(&self) -> Option<Self> {
        serialport::SerialPort::try_clone(self.as_ref()).ok()
    }
}

impl ConsoleTryClone for std::net::TcpStream {
    fn try_clone(&self) -> Option<Self> {
        std::net::TcpStream::try_clone(self).ok()
    }
}

impl ConsoleTryClone for std::fs::File {
    fn try_clone(&self) -> Option<Self> {
        std::fs::File::try_clone(self).ok()
    }
}

impl ConsoleTryClone for crate::common::SerialPort {
    fn try_clone(&self) -> Option<Self> {
        match self {
            Self::Serial(port) => ConsoleTryClone::try_clone(port.get_ref())
                .map(std::io::BufWriter::new)
                .map(Self::Serial),

            Self::File(port) => ConsoleTryClone::try_clone(port.get_ref())
                .map(std::io::BufWriter::new)
                .map(Self::File),

            Self::Tcp(port) => ConsoleTryClone::try_clone(port.get_ref())
                .map(std::io::BufWriter::new)
                .map(Self::Tcp),
        }
    }
}

/// Describe a received line for the console.
pub fn describe(line: &[u8]) -> String {
    match Response::parse(line) {
        Ok(resp) => {
            let status = if resp.success { "ok" } else { "err" };
            match resp.message {
                Some(message) => format!("{} {}", status, message),
                None => status.to_owned(),
            }
        }
        Err(e) => match std::str::from_utf8(line) {
            // a device with echo on sends our requests back
            Ok(s) if e == ResponseError::BadStatus && linecmd::frame::verify(line).is_ok() => {
                format!("(echo) {}", s)
            }
            Ok(s) => format!("!!! {}: {}", e, s),
            Err(_) => format!("!!! {}:\n{}", e, crate::hexdump::hexdump_format(line)),
        },
    }
}

pub struct Console<F> {
    port: F,
}

impl<F> Console<F>
where
    F: Read + Write + Send + ConsoleTryClone,
{
    pub fn new(port: F) -> Self {
        Self { port }
    }

    pub fn run(self) -> anyhow::Result<()> {
        let mut rl = DefaultEditor::new()?;
        let mut printer = rl.create_external_printer()?;

        let writer = self
            .port
            .try_clone()
            .ok_or_else(|| anyhow::anyhow!("could not get writer from port"))?;
        let mut outgoing = ClientStd::<_, 256>::new(linecmd::FromStd::new(writer));
        let mut incoming = ClientStd::<_, 256>::new(linecmd::FromStd::new(self.port));

        std::thread::scope(|s| {
            let reader = s.spawn(move || -> anyhow::Result<()> {
                loop {
                    match incoming.read_line() {
                        Ok([]) => {}
                        Ok(line) => printer.print(format!("{}\n", describe(line)))?,
                        Err(ref e) if crate::common::is_timeout(e) => continue,
                        Err(e) => anyhow::bail!(e),
                    }
                }
            });

            loop {
                if reader.is_finished() {
                    reader
                        .join()
                        .map_err(|_| anyhow::anyhow!("reader thread panicked"))??;
                    anyhow::bail!("reader thread stopped");
                }

                match rl.readline("> ") {
                    Ok(line) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        rl.add_history_entry(&line)?;
                        if let Err(e) = outgoing.send(&line) {
                            eprintln!("!!! {}", e);
                        }
                    }

                    Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                        std::process::exit(0);
                    }

                    Err(e) => Err(e)?,
                };
            }
        })
    }
}
