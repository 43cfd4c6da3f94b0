use crate::{Error, Result};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use super::Transport;

/// One scripted answer to the next read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Data(Vec<u8>),
    /// Nothing arrives before the timeout.
    Silence,
    Fail(io::ErrorKind),
}

impl Scripted {
    pub fn data(bytes: impl AsRef<[u8]>) -> Self {
        Scripted::Data(bytes.as_ref().to_vec())
    }
}

/// Everything the fake saw on the wire, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireOp {
    Reset,
    Write(Vec<u8>),
    Read(Vec<u8>),
}

#[derive(Default)]
struct FakeState {
    script: VecDeque<Scripted>,
    log: Vec<WireOp>,
    write_failure: Option<io::ErrorKind>,
}

/// Scripted in-memory transport. Clones share the same script and log, so a
/// test can keep one handle while the session owns another.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
    read_delay: Duration,
}

impl FakeTransport {
    pub fn new(script: Vec<Scripted>) -> Self {
        let fake = Self::default();
        fake.state().script = script.into();
        fake
    }

    /// Stall every read, to widen the window in which exchanges could overlap.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub fn push(&self, reply: Scripted) {
        self.state().script.push_back(reply);
    }

    pub fn fail_writes(&self, kind: Option<io::ErrorKind>) {
        self.state().write_failure = kind;
    }

    pub fn log(&self) -> Vec<WireOp> {
        self.state().log.clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.state()
            .log
            .iter()
            .filter_map(|op| match op {
                WireOp::Write(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.state().script.len()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_reply(&self) -> Result<Vec<u8>> {
        if !self.read_delay.is_zero() {
            thread::sleep(self.read_delay);
        }
        match self.state().script.pop_front() {
            Some(Scripted::Data(bytes)) => Ok(bytes),
            Some(Scripted::Silence) | None => Ok(Vec::new()),
            Some(Scripted::Fail(kind)) => Err(Error::Io(io::Error::new(kind, "scripted failure"))),
        }
    }

    fn record_read(&self, bytes: Vec<u8>) -> Vec<u8> {
        self.state().log.push(WireOp::Read(bytes.clone()));
        bytes
    }
}

impl Transport for FakeTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state();
        if let Some(kind) = state.write_failure {
            return Err(Error::Io(io::Error::new(kind, "scripted write failure")));
        }
        state.log.push(WireOp::Write(bytes.to_vec()));
        Ok(())
    }

    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut bytes = self.next_reply()?;
        bytes.truncate(n);
        Ok(self.record_read(bytes))
    }

    fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>> {
        let mut bytes = self.next_reply()?;
        if let Some(pos) = bytes.iter().position(|b| *b == delimiter) {
            bytes.truncate(pos + 1);
        }
        Ok(self.record_read(bytes))
    }

    fn reset_buffers(&mut self) -> Result<()> {
        self.state().log.push(WireOp::Reset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_scripts_reads_and_writes() {
        let mut fake = FakeTransport::new(vec![
            Scripted::data("ACK\rtrailing"),
            Scripted::Fail(io::ErrorKind::BrokenPipe),
        ]);
        let handle = fake.clone();
        fake.write(b"KEY 1 1000\r").unwrap();
        assert_eq!(fake.read_until(b'\r').unwrap(), b"ACK\r".to_vec());
        assert!(fake.read_exact(41).is_err());
        assert!(fake.read_exact(41).unwrap().is_empty());
        assert_eq!(handle.writes(), vec!["KEY 1 1000\r".to_string()]);
    }

    #[test]
    fn read_exact_never_returns_more_than_asked() {
        let mut fake = FakeTransport::new(vec![Scripted::data([b'x'; 50])]);
        assert_eq!(fake.read_exact(41).unwrap().len(), 41);
    }

    #[test]
    fn write_failure_is_io_error() {
        let mut fake = FakeTransport::default();
        fake.fail_writes(Some(io::ErrorKind::BrokenPipe));
        assert!(matches!(fake.write(b"DISPLAY 0\r"), Err(Error::Io(_))));
        assert!(fake.log().is_empty());
    }
}
