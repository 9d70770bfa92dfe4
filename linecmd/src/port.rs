/// Drive an [crate::Engine] from a blocking [std::io] stream.
///
/// [embedded_io::ReadReady] is answered by attempting a one-byte read
/// and holding on to the result. Give the stream a short read timeout
/// (or make it non-blocking) so that [crate::Engine::poll()] returns
/// when the peer goes quiet.
#[derive(Debug)]
pub struct StdPort<T> {
    inner: T,
    peeked: Option<u8>,
    eof: bool,
}

impl<T> StdPort<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            peeked: None,
            eof: false,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> embedded_io::ErrorType for StdPort<T> {
    type Error = std::io::Error;
}

impl<T> embedded_io::ReadReady for StdPort<T>
where
    T: std::io::Read,
{
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if self.peeked.is_some() || self.eof {
            return Ok(true);
        }

        let mut byte = [0u8; 1];
        match self.inner.read(&mut byte) {
            Ok(0) => {
                // report ready, so the next read sees the eof
                self.eof = true;
                Ok(true)
            }
            Ok(_) => {
                self.peeked = Some(byte[0]);
                Ok(true)
            }
            Err(e) => match e.kind() {
                std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::WouldBlock
                | std::io::ErrorKind::Interrupted => Ok(false),
                _ => Err(e),
            },
        }
    }
}

impl<T> embedded_io::Read for StdPort<T>
where
    T: std::io::Read,
{
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(b) = self.peeked.take() {
            buf[0] = b;
            return Ok(1);
        }
        if self.eof {
            return Ok(0);
        }
        self.inner.read(buf)
    }
}

impl<T> embedded_io::Write for StdPort<T>
where
    T: std::io::Write,
{
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.inner.flush()
    }
}
