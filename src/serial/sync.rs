use crate::{Error, Result};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use super::{SerialOptions, Transport, MAX_RESPONSE_BYTES};

/// Blocking UART link to the controller (8N1, no flow control).
pub struct SerialPort {
    device: String,
    baud: u32,
    timeout: Duration,
    port: Box<dyn serialport::SerialPort>,
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort")
            .field("device", &self.device)
            .field("baud", &self.baud)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SerialPort {
    pub fn connect(device: &str, options: SerialOptions) -> Result<Self> {
        if device.is_empty() {
            return Err(Error::InvalidArgs(
                "device path cannot be empty".to_string(),
            ));
        }
        if options.timeout_ms == 0 {
            return Err(Error::InvalidArgs(
                "serial timeout must be greater than zero".to_string(),
            ));
        }

        let port = serialport::new(device, options.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(options.timeout())
            .open()
            .map_err(map_serial_error)?;

        Ok(Self {
            device: device.to_string(),
            baud: options.baud,
            timeout: options.timeout(),
            port,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// Read once into `buf` with whatever is left of the deadline. Returns 0 once it passed.
    fn read_before(&mut self, buf: &mut [u8], deadline: Instant) -> Result<usize> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(0);
            }
            self.port.set_timeout(remaining).map_err(map_serial_error)?;
            match self.port.read(buf) {
                Ok(read) => return Ok(read),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(0),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

impl Transport for SerialPort {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let read = self.read_before(&mut buf[filled..], deadline)?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.timeout;
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        // Byte-by-byte so nothing past the delimiter is consumed.
        while out.len() < MAX_RESPONSE_BYTES {
            if self.read_before(&mut byte, deadline)? == 0 {
                break;
            }
            out.push(byte[0]);
            if byte[0] == delimiter {
                break;
            }
        }
        Ok(out)
    }

    fn reset_buffers(&mut self) -> Result<()> {
        self.port
            .clear(ClearBuffer::All)
            .map_err(map_serial_error)
    }
}

fn map_serial_error(err: serialport::Error) -> Error {
    use serialport::ErrorKind;

    let kind = match err.kind() {
        ErrorKind::NoDevice => io::ErrorKind::NotFound,
        ErrorKind::InvalidInput => io::ErrorKind::InvalidInput,
        ErrorKind::Io(inner) => inner,
        ErrorKind::Unknown => io::ErrorKind::Other,
    };

    Error::Io(io::Error::new(kind, err))
}
