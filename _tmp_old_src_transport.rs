//! The transport boundary: whatever the transactor needs from a byte-stream, independent of
//! whether it's backed by a real serial port or a mock used in tests.

use std::io;
use std::time::Duration;

/// A half-duplex byte transport: blocking write, blocking read-with-timeout, and baud-rate
/// reconfiguration. The transactor is generic over this trait so it never depends on
/// `serialport` directly.
pub trait Transport {
    /// Write the whole buffer. Treated as bounded and non-blocking by the transactor.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read whatever is available into `buf`, blocking up to `timeout`. Returns `Ok(0)` on a
    /// timeout with no data (never an error) so the transactor's receive loop can keep polling
    /// until its own deadline.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Reconfigure the baud rate of the underlying link.
    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()>;
}

/// A [`Transport`] backed by a real serial port (8 data bits, 1 stop bit, no parity, no flow
/// control), opened via the `serialport` crate.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Open `path` at `baud_rate` with 8-N-1 framing and no flow control.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, serialport::Error> {
        let port = serialport::new(path, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(10))
            .open()?;
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.port.set_timeout(timeout)?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        self.port.set_baud_rate(baud_rate)?;
        Ok(())
    }
}

use std::io::Write as _;

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;

    /// An in-memory [`Transport`] for unit tests: written bytes are recorded, and reads drain a
    /// pre-queued sequence of byte chunks (each chunk simulating one `read()` syscall's worth of
    /// data, so tests can model partial/delayed delivery).
    #[derive(Default)]
    pub struct MockTransport {
        pub written: Vec<u8>,
        pub chunks: VecDeque<Vec<u8>>,
        pub baud_rate: u32,
    }

    impl MockTransport {
        pub fn with_chunks(chunks: Vec<Vec<u8>>) -> Self {
            Self { written: Vec::new(), chunks: chunks.into(), baud_rate: 1_000_000 }
        }
    }

    impl Transport for MockTransport {
        fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            self.written.extend_from_slice(data);
            Ok(())
        }

        fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
            let Some(chunk) = self.chunks.pop_front() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            Ok(n)
        }

        fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
            self.baud_rate = baud_rate;
            Ok(())
        }
    }
}

