use std::fmt;

use linecmd::{respond, Args, Command, Engine, Respond, StdPort};

#[derive(clap::Args, Debug)]
pub struct SimulateOpts {
    #[arg(default_value = "localhost:8855")]
    bind: String,
    #[command(flatten)]
    debug: crate::debug::DebugArgs,
    /// Echo received bytes back, like a terminal would.
    #[arg(long)]
    echo: bool,
    #[arg(long, default_value = "linecmd-sim")]
    version: String,
}

impl crate::ToolRun for SimulateOpts {
    fn run(&self) -> anyhow::Result<()> {
        let mut device = Device::new(&self.version);

        let listener = std::net::TcpListener::bind(&self.bind)?;
        eprintln!("Listening on {}.", self.bind);

        loop {
            let (stream, addr) = listener.accept()?;
            eprintln!("Connected to {}.", addr);

            // short timeout so poll() comes back when the host is quiet
            stream.set_read_timeout(Some(std::time::Duration::from_millis(100)))?;
            let port = StdPort::new(self.debug.wrap(stream));

            let result = if self.echo {
                serve::<_, true>(port, &mut device)
            } else {
                serve::<_, false>(port, &mut device)
            };

            match result {
                Err(linecmd::Error::UnexpectedEof) => {
                    eprintln!("Disconnected from {}.", addr);
                }
                Err(linecmd::Error::Io(e)) => anyhow::bail!(e),
                // serve only returns on error
                Ok(()) => {}
            }
        }
    }
}

fn serve<P, const ECHO: bool>(port: P, device: &mut Device) -> Result<(), linecmd::Error<P::Error>>
where
    P: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    let mut engine =
        Engine::<'static, Device, P, 64, 5, 16, ECHO>::with_commands(port, &DEVICE_COMMANDS);
    loop {
        engine.poll(device)?;
    }
}

pub const REGISTERS: usize = 16;

/// A pretend device with some registers and an LED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    version: String,
    registers: [u16; REGISTERS],
    led: bool,
    requests: u32,
}

impl Device {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_owned(),
            registers: [0; REGISTERS],
            led: false,
            requests: 0,
        }
    }
}

pub static DEVICE_COMMANDS: [Command<Device>; 6] = [
    Command::new("ping", ping),
    Command::new("echo", echo),
    Command::new("get", get),
    Command::new("set", set),
    Command::new("led", led),
    Command::new("info", info),
];

/// Arguments joined back up with spaces. Fails to format if any
/// argument is not UTF-8.
struct Joined<'a>(Args<'a>);

impl<'a> fmt::Display for Joined<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, arg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            f.write_str(std::str::from_utf8(arg).map_err(|_| fmt::Error)?)?;
        }
        Ok(())
    }
}

fn register(args: &Args<'_>, i: usize) -> Option<usize> {
    args.parse::<usize>(i).filter(|r| *r < REGISTERS)
}

fn ping(device: &mut Device, resp: &mut dyn Respond, _args: Args<'_>) {
    device.requests += 1;
    resp.respond_ok();
}

fn echo(device: &mut Device, resp: &mut dyn Respond, args: Args<'_>) {
    device.requests += 1;
    if args.is_empty() {
        resp.respond_ok();
    } else {
        respond!(resp, true, "{}", Joined(args));
    }
}

fn get(device: &mut Device, resp: &mut dyn Respond, args: Args<'_>) {
    device.requests += 1;
    match register(&args, 0) {
        Some(r) => respond!(resp, true, "{}", device.registers[r]),
        None => resp.respond_str(false, "bad_register"),
    }
}

fn set(device: &mut Device, resp: &mut dyn Respond, args: Args<'_>) {
    device.requests += 1;
    let Some(r) = register(&args, 0) else {
        return resp.respond_str(false, "bad_register");
    };
    let Some(value) = args.parse::<u16>(1) else {
        return resp.respond_str(false, "bad_value");
    };
    device.registers[r] = value;
    resp.respond_ok();
}

fn led(device: &mut Device, resp: &mut dyn Respond, args: Args<'_>) {
    device.requests += 1;
    match args.str(0) {
        Some("on") => device.led = true,
        Some("off") => device.led = false,
        None => {}
        Some(_) => return resp.respond_str(false, "bad_state"),
    }
    resp.respond_str(true, if device.led { "on" } else { "off" });
}

fn info(device: &mut Device, resp: &mut dyn Respond, _args: Args<'_>) {
    device.requests += 1;
    respond!(resp, true, "{} {}", device.version, device.requests);
}
