use std::io::{Read, Write};

#[derive(clap::Args, Debug, Clone)]
pub struct DebugArgs {
    /// Print traffic to stderr. Repeat for hex dumps.
    #[arg(short, long, action=clap::ArgAction::Count)]
    pub debug: u8,
}

impl DebugArgs {
    /// Wrap a stream so traffic is traced at the requested level.
    pub fn wrap<T>(&self, inner: T) -> TraceStream<T> {
        TraceStream::new(inner, self.debug)
    }
}

/// A stream that prints each line passing through it to stderr.
///
/// `>>>` is for lines written, `<<<` for lines read. Lines are printed
/// once complete, so byte-at-a-time readers still see whole lines.
#[derive(Debug)]
pub struct TraceStream<T> {
    inner: T,
    level: u8,
    incoming: Vec<u8>,
    outgoing: Vec<u8>,
}

impl<T> TraceStream<T> {
    pub fn new(inner: T, level: u8) -> Self {
        Self {
            inner,
            level,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        }
    }
}

fn trace_lines(prefix: &str, level: u8, pending: &mut Vec<u8>, data: &[u8]) {
    if level == 0 {
        return;
    }

    for b in data {
        if linecmd::DELIMITERS.contains(b) {
            // skip the LF of a CR LF pair
            if !pending.is_empty() || *b == b'\r' {
                trace_line(prefix, level, &pending[..]);
            }
            pending.clear();
        } else {
            pending.push(*b);
        }
    }
}

pub fn trace_line(prefix: &str, level: u8, line: &[u8]) {
    if level == 0 {
        return;
    }

    eprintln!("{} {}", prefix, String::from_utf8_lossy(line));
    if level >= 2 {
        crate::hexdump::ehexdump_prefix(&format!("{}   ", prefix), line);
    }
}

impl<T> Read for TraceStream<T>
where
    T: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let amt = self.inner.read(buf)?;
        trace_lines("<<<", self.level, &mut self.incoming, &buf[..amt]);
        Ok(amt)
    }
}

impl<T> Write for TraceStream<T>
where
    T: Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let amt = self.inner.write(buf)?;
        trace_lines(">>>", self.level, &mut self.outgoing, &buf[..amt]);
        Ok(amt)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<T> crate::console::ConsoleTryClone for TraceStream<T>
where
    T: crate::console::ConsoleTryClone,
{
    fn try_clone(&self) -> Option<Self> {
        self.inner
            .try_clone()
            .map(|inner| Self::new(inner, self.level))
    }
}
