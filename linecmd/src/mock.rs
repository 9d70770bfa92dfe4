// An in-memory port for tests.

use std::collections::VecDeque;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MockPort {
    input: VecDeque<u8>,
    output: Vec<u8>,
    pub writes: usize,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.output)
    }

    pub fn take_lines(&mut self) -> Vec<String> {
        let output = self.take_output();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| l.to_owned())
            .collect()
    }
}

impl embedded_io::ErrorType for MockPort {
    type Error = core::convert::Infallible;
}

impl embedded_io::Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut amt = 0;
        while amt < buf.len() {
            let Some(b) = self.input.pop_front() else {
                break;
            };
            buf[amt] = b;
            amt += 1;
        }
        Ok(amt)
    }
}

impl embedded_io::ReadReady for MockPort {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.input.is_empty())
    }
}

impl embedded_io::Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.output.extend_from_slice(buf);
        self.writes += 1;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
