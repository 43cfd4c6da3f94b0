//! The single entry point to the controller link.
//!
//! A [`Session`] owns the transport behind a mutex so that a key press and a
//! scheduled display refresh can never interleave on the wire. Every exchange
//! runs `reset_buffers -> write -> read -> decode -> health update -> publish`
//! while holding that lock.

use crate::{
    health::{FailureCause, HealthChange, LinkHealth, DEFAULT_FAILURE_THRESHOLD},
    protocol::{
        decode_display, decode_key_response, Command, DecodeOutcome, DisplayFrame, KeyReply,
        DEFAULT_DISPLAY_PAGE, DISPLAY_RESPONSE_LEN, TERMINATOR,
    },
    serial::{classify_error, SerialFailureKind, SerialOptions, SerialPort, Transport},
    Result,
};
use crossbeam::channel::Receiver;
use log::{debug, error, info, warn};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Instant;

mod events;

pub use events::{EventBus, KeyOutcome, SessionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub display_page: u32,
    pub failure_threshold: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            display_page: DEFAULT_DISPLAY_PAGE,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

/// How a single display refresh ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayOutcome {
    Updated(DisplayFrame),
    Timeout,
    Malformed,
    Failed(SerialFailureKind),
}

struct Link<T> {
    transport: T,
    health: LinkHealth,
    frame: Option<DisplayFrame>,
    last_key_press: Option<Instant>,
}

impl<T: Transport> Link<T> {
    fn exchange<F>(&mut self, command: &Command, read: F) -> Result<Vec<u8>>
    where
        F: FnOnce(&mut T) -> Result<Vec<u8>>,
    {
        let wire = command.encode();
        debug!("sending command: {}", wire.trim_end());
        self.transport.reset_buffers()?;
        self.transport.write(wire.as_bytes())?;
        read(&mut self.transport)
    }
}

pub struct Session<T> {
    link: Mutex<Link<T>>,
    events: EventBus,
    display_page: u32,
}

impl Session<SerialPort> {
    /// Open the serial device. Failure here is fatal for the caller.
    pub fn open(device: &str, serial: SerialOptions, options: SessionOptions) -> Result<Self> {
        let port = SerialPort::connect(device, serial)?;
        info!(
            "serial connected (device={}, baud={}, timeout={}ms)",
            port.device(),
            port.baud(),
            serial.timeout_ms
        );
        Ok(Self::new(port, options))
    }
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, options: SessionOptions) -> Self {
        Self {
            link: Mutex::new(Link {
                transport,
                health: LinkHealth::new(options.failure_threshold),
                frame: None,
                last_key_press: None,
            }),
            events: EventBus::default(),
            display_page: options.display_page,
        }
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Page polled by the scheduler.
    pub fn display_page(&self) -> u32 {
        self.display_page
    }

    pub fn health(&self) -> LinkHealth {
        self.lock().health.clone()
    }

    /// Last frame successfully decoded, if any.
    pub fn frame(&self) -> Option<DisplayFrame> {
        self.lock().frame.clone()
    }

    pub fn last_key_press(&self) -> Option<Instant> {
        self.lock().last_key_press
    }

    /// Close a key contact for `duration_ms`. Only argument errors are
    /// returned; link trouble is reported inside the outcome.
    pub fn request_key_press(&self, index: u8, duration_ms: u32) -> Result<KeyOutcome> {
        let command = Command::key_press(index, duration_ms)?;
        let mut link = self.lock();

        let (reply, fault) = match link.exchange(&command, |t| t.read_until(TERMINATOR)) {
            Ok(raw) => {
                debug!("raw key response: {:?}", String::from_utf8_lossy(&raw));
                (decode_key_response(&raw), None)
            }
            Err(err) => {
                error!("failed to send key command: {err}");
                (KeyReply::Empty, Some(classify_error(&err)))
            }
        };

        if fault.is_none() {
            link.last_key_press = Some(Instant::now());
        }
        if reply.is_empty() {
            if fault.is_none() {
                warn!("no response received for key {index}");
            }
        } else {
            info!("key {index} response: {reply}");
            let change = link.health.record_success();
            self.publish_health(&link.health, change);
        }

        let outcome = KeyOutcome {
            index,
            duration_ms,
            reply,
            error: fault,
        };
        self.events.publish(SessionEvent::Key(outcome.clone()));
        Ok(outcome)
    }

    /// Refresh the display, waiting for any exchange already in flight.
    pub fn refresh_display(&self, page: u32) -> DisplayOutcome {
        let mut link = self.lock();
        self.refresh_locked(&mut link, page)
    }

    /// Refresh the display unless another exchange holds the link, in which
    /// case nothing is sent and `None` comes back.
    pub fn try_refresh_display(&self, page: u32) -> Option<DisplayOutcome> {
        let mut link = match self.link.try_lock() {
            Ok(link) => link,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(self.refresh_locked(&mut link, page))
    }

    fn refresh_locked(&self, link: &mut Link<T>, page: u32) -> DisplayOutcome {
        let command = Command::display(page);
        let outcome = match link.exchange(&command, |t| t.read_exact(DISPLAY_RESPONSE_LEN)) {
            Ok(raw) => {
                debug!("raw display response: {:?}", String::from_utf8_lossy(&raw));
                match decode_display(&raw) {
                    DecodeOutcome::Frame(frame) => DisplayOutcome::Updated(frame),
                    DecodeOutcome::Timeout => DisplayOutcome::Timeout,
                    DecodeOutcome::Malformed { len, reason } => {
                        warn!("ignoring display response ({reason}, {len} bytes)");
                        DisplayOutcome::Malformed
                    }
                    DecodeOutcome::Garbled => {
                        warn!("display response is not text");
                        DisplayOutcome::Failed(SerialFailureKind::Framing)
                    }
                }
            }
            Err(err) => {
                let kind = classify_error(&err);
                warn!("communication error during display refresh: {err}");
                DisplayOutcome::Failed(kind)
            }
        };

        let change = match &outcome {
            DisplayOutcome::Updated(frame) => {
                info!("display updated: {frame}");
                link.frame = Some(frame.clone());
                self.events.publish(SessionEvent::Frame(frame.clone()));
                link.health.record_success()
            }
            DisplayOutcome::Timeout => {
                let change = link.health.record_failure(FailureCause::Timeout);
                warn!(
                    "no response from VMC (attempt {}/{})",
                    link.health.consecutive_failures(),
                    link.health.threshold()
                );
                change
            }
            DisplayOutcome::Failed(kind) => {
                let change = link.health.record_failure(FailureCause::Io(*kind));
                warn!(
                    "communication error ({kind}: {}) (attempt {}/{})",
                    kind.hint(),
                    link.health.consecutive_failures(),
                    link.health.threshold()
                );
                change
            }
            DisplayOutcome::Malformed => HealthChange::Unchanged,
        };
        self.publish_health(&link.health, change);
        outcome
    }

    fn publish_health(&self, health: &LinkHealth, change: HealthChange) {
        match change {
            HealthChange::Degraded => error!("max consecutive errors reached; link degraded"),
            HealthChange::Recovered => info!("link recovered"),
            HealthChange::StillDegraded | HealthChange::Unchanged => {}
        }
        if change.should_publish() {
            self.events.publish(SessionEvent::Health(health.clone()));
        }
    }

    fn lock(&self) -> MutexGuard<'_, Link<T>> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }
}
