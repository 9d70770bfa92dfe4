use clap::Parser;

mod common;
mod console;
mod crc;
mod debug;
mod hexdump;
mod send;
mod simulate;

trait ToolRun {
    fn run(&self) -> anyhow::Result<()>;
}

/// Talk to devices speaking the linecmd protocol.
#[derive(Parser, Debug)]
#[command(version, about)]
struct ToolOptions {
    #[command(subcommand)]
    command: ToolCommand,
}

#[derive(clap::Subcommand, Debug)]
enum ToolCommand {
    /// Send one request and print the response.
    Send(send::SendOpts),
    /// Interactive prompt.
    Console(console::ConsoleOpts),
    /// Run a demo device on a TCP port.
    Simulate(simulate::SimulateOpts),
    /// Print the checksum and framed request for some text.
    Crc(crc::CrcOpts),
}

impl ToolRun for ToolCommand {
    fn run(&self) -> anyhow::Result<()> {
        use ToolCommand::*;
        match self {
            Send(o) => o.run(),
            Console(o) => o.run(),
            Simulate(o) => o.run(),
            Crc(o) => o.run(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let opts = ToolOptions::parse();
    opts.command.run()
}
