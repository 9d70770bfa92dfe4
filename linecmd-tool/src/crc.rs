#[derive(clap::Args, Debug)]
pub struct CrcOpts {
    /// Text to checksum, joined with spaces.
    #[arg(required = true)]
    text: Vec<String>,
}

impl crate::ToolRun for CrcOpts {
    fn run(&self) -> anyhow::Result<()> {
        let text = self.text.join(" ");
        println!("crc: {:04x}", linecmd::crc::crc16(text.as_bytes()));

        // room for " *ffff\n"
        let mut framed = vec![0; text.len() + 7];
        let len = linecmd::host::encode_request(&text, &mut framed)?;
        print!("request: {}", String::from_utf8_lossy(&framed[..len]));
        Ok(())
    }
}
