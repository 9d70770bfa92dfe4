use linecmd::host::ClientStd;

#[derive(clap::Args, Debug)]
pub struct SendOpts {
    #[command(flatten)]
    port: crate::common::SerialPortArgs,
    #[command(flatten)]
    debug: crate::debug::DebugArgs,

    /// The command and its arguments.
    #[arg(required = true, last = true)]
    words: Vec<String>,
}

impl crate::ToolRun for SendOpts {
    fn run(&self) -> anyhow::Result<()> {
        let port = self.debug.wrap(self.port.open()?);
        let mut client = ClientStd::<_, 256>::new(linecmd::FromStd::new(port));

        let line = self.words.join(" ");
        let resp = client.request(&line)?;
        if let Some(message) = resp.message {
            println!("{}", message);
        }

        if !resp.success {
            match resp.reason() {
                Some(reason) => anyhow::bail!("device rejected request: {}", reason),
                None => anyhow::bail!("command failed"),
            }
        }

        Ok(())
    }
}
