use crate::{
    protocol::Command,
    serial::Transport,
    session::Session,
    Error, Result,
};
use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, warn};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 750;

/// Fixed-rate tick grid. Ticks land on `start + k * interval` no matter how
/// long an exchange takes; slots that an exchange overran are dropped.
#[derive(Debug, Clone, Copy)]
pub struct FixedRate {
    interval: Duration,
    next: Instant,
}

impl FixedRate {
    pub fn new(start: Instant, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        Self {
            interval,
            next: start + interval,
        }
    }

    pub fn next_tick(&self) -> Instant {
        self.next
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }

    /// Move to the first slot after `now`. Returns the number of slots skipped.
    pub fn advance(&mut self, now: Instant) -> u64 {
        let mut skipped = 0;
        self.next += self.interval;
        while self.next <= now {
            self.next += self.interval;
            skipped += 1;
        }
        skipped
    }
}

#[derive(Debug)]
enum WorkerRequest {
    KeyPress { index: u8, duration_ms: u32 },
    Shutdown,
}

/// Guard for the link worker. Dropping it stops the worker and waits for the
/// exchange in flight to finish.
pub struct PollingHandle {
    requests: Sender<WorkerRequest>,
    running: Arc<AtomicBool>,
    skipped: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl PollingHandle {
    /// Queue a key press behind whatever the worker is doing. Never blocks on the link.
    pub fn request_key_press(&self, index: u8, duration_ms: u32) -> Result<()> {
        Command::key_press(index, duration_ms)?;
        self.requests
            .send(WorkerRequest::KeyPress { index, duration_ms })
            .map_err(|_| Error::Io(io::Error::other("link worker is not running")))
    }

    /// Ticks dropped because an exchange was still in flight.
    pub fn ticks_skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.requests.send(WorkerRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("link worker panicked");
            }
        }
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the worker that refreshes the display every `interval` and serves
/// queued key presses in between.
pub fn start_polling<T>(
    session: Arc<Session<T>>,
    interval: Duration,
    app_running: Arc<AtomicBool>,
) -> Result<PollingHandle>
where
    T: Transport + Send + 'static,
{
    let (tx, rx) = channel::unbounded();
    let running = Arc::new(AtomicBool::new(true));
    let skipped = Arc::new(AtomicU64::new(0));
    let worker = Worker {
        session,
        requests: rx,
        interval,
        running: running.clone(),
        app_running,
        skipped: skipped.clone(),
    };
    let thread = thread::Builder::new()
        .name("vmclink-poller".into())
        .spawn(move || worker.run())?;
    Ok(PollingHandle {
        requests: tx,
        running,
        skipped,
        thread: Some(thread),
    })
}

struct Worker<T> {
    session: Arc<Session<T>>,
    requests: Receiver<WorkerRequest>,
    interval: Duration,
    running: Arc<AtomicBool>,
    app_running: Arc<AtomicBool>,
    skipped: Arc<AtomicU64>,
}

impl<T: Transport> Worker<T> {
    fn alive(&self) -> bool {
        self.app_running.load(Ordering::SeqCst) && self.running.load(Ordering::SeqCst)
    }

    fn run(self) {
        let page = self.session.display_page();
        let mut schedule = FixedRate::new(Instant::now(), self.interval);
        debug!("link worker started (interval={}ms)", self.interval.as_millis());

        'worker: while self.alive() {
            // A due tick goes first so a backlog of key presses cannot starve the display.
            let wait = schedule.remaining(Instant::now());
            if wait.is_zero() {
                self.tick(page, &mut schedule);
                continue;
            }
            crossbeam::select! {
                recv(self.requests) -> msg => match msg {
                    Ok(WorkerRequest::KeyPress { index, duration_ms }) => {
                        if let Err(err) = self.session.request_key_press(index, duration_ms) {
                            warn!("key press rejected: {err}");
                        }
                    }
                    Ok(WorkerRequest::Shutdown) | Err(_) => break 'worker,
                },
                default(wait) => self.tick(page, &mut schedule),
            }
        }
        debug!("link worker stopped");
    }

    fn tick(&self, page: u32, schedule: &mut FixedRate) {
        if self.session.try_refresh_display(page).is_none() {
            debug!("display tick skipped: exchange in flight");
            self.skipped.fetch_add(1, Ordering::Relaxed);
        }
        let overrun = schedule.advance(Instant::now());
        if overrun > 0 {
            debug!("exchange overran {overrun} tick(s); coalesced");
            self.skipped.fetch_add(overrun, Ordering::Relaxed);
        }
    }
}
