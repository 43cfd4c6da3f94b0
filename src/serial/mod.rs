use crate::Result;
use std::time::Duration;

pub mod errors;
pub mod fake;
pub mod sync;

pub use errors::{classify_error, classify_io_error, SerialFailureKind};
pub use sync::SerialPort;

pub const DEFAULT_BAUD: u32 = 9_600;
pub const DEFAULT_SERIAL_TIMEOUT_MS: u64 = 1_000;
/// Upper bound for a delimiter-terminated read before it gives up on the terminator.
pub const MAX_RESPONSE_BYTES: usize = 256;

/// Line settings for the VMC link. Framing is fixed at 8N1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialOptions {
    pub baud: u32,
    pub timeout_ms: u64,
}

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD,
            timeout_ms: DEFAULT_SERIAL_TIMEOUT_MS,
        }
    }
}

impl SerialOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Byte-level link to the controller.
///
/// Reads never fail on timeout: they hand back whatever arrived before the
/// deadline, which may be nothing. Errors are reserved for real I/O faults.
pub trait Transport {
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read until `n` bytes arrived or the timeout elapsed.
    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>>;

    /// Read until `delimiter` (inclusive) arrived or the timeout elapsed.
    fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>>;

    /// Discard stale bytes in both directions.
    fn reset_buffers(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        (**self).read_exact(n)
    }

    fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>> {
        (**self).read_until(delimiter)
    }

    fn reset_buffers(&mut self) -> Result<()> {
        (**self).reset_buffers()
    }
}
