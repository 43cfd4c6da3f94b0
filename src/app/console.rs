use crate::{
    cli::OutputFormat,
    config::Config,
    health::{FailureCause, HealthState, LinkHealth},
    polling::PollingHandle,
    session::SessionEvent,
    Result,
};
use crossbeam::channel::{self, Receiver};
use log::{debug, warn};
use std::io::{self, BufRead, Write};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

const SHUTDOWN_CHECK_MS: u64 = 200;

/// Two-line banner shown while the link is degraded.
pub(crate) fn degraded_banner(health: &LinkHealth) -> Option<(&'static str, &'static str)> {
    if health.state() != HealthState::Degraded {
        return None;
    }
    match health.last_failure() {
        Some(FailureCause::Io(_)) => Some(("Error", "Check Connection")),
        Some(FailureCause::Timeout) | None => Some(("Timeout Error", "No VMC Response")),
    }
}

pub(crate) fn render_event(event: &SessionEvent, format: OutputFormat, labels: &[String]) -> String {
    if format == OutputFormat::Json {
        return serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
    }
    match event {
        SessionEvent::Frame(frame) => format!("[{}]\n[{}]", frame.upper(), frame.lower()),
        SessionEvent::Health(health) => match degraded_banner(health) {
            Some((upper, lower)) => format!("!! {upper}\n!! {lower}"),
            None => "link nominal".to_string(),
        },
        SessionEvent::Key(outcome) => {
            let label = labels
                .get(usize::from(outcome.index))
                .cloned()
                .unwrap_or_else(|| format!("Key {}", outcome.index));
            match outcome.error {
                Some(kind) => format!("{label}: error ({kind}, {})", kind.hint()),
                None => format!("{label}: {}", outcome.reply),
            }
        }
    }
}

/// Terminal front-end: key requests come from stdin lines, events go to stdout.
pub(super) struct Console {
    format: OutputFormat,
    config: Config,
}

impl Console {
    pub(super) fn new(config: &Config, format: OutputFormat) -> Self {
        Self {
            format,
            config: config.clone(),
        }
    }

    pub(super) fn run(
        &self,
        worker: &PollingHandle,
        events: Receiver<SessionEvent>,
        running: Arc<AtomicBool>,
    ) -> Result<()> {
        let mut lines = spawn_stdin_reader()?;
        let check = channel::tick(Duration::from_millis(SHUTDOWN_CHECK_MS));
        let stdout = io::stdout();

        'console: while running.load(Ordering::SeqCst) && worker.is_running() {
            let mut stdin_closed = false;
            crossbeam::select! {
                recv(events) -> event => match event {
                    Ok(event) => {
                        let line = render_event(&event, self.format, &self.config.key_labels);
                        let mut out = stdout.lock();
                        writeln!(out, "{line}")?;
                        out.flush()?;
                    }
                    Err(_) => break 'console,
                },
                recv(lines) -> line => match line {
                    Ok(line) => {
                        if !self.handle_line(worker, &line) {
                            running.store(false, Ordering::SeqCst);
                        }
                    }
                    Err(_) => stdin_closed = true,
                },
                recv(check) -> _ => {}
            }
            if stdin_closed {
                debug!("stdin closed; console keeps rendering");
                lines = channel::never();
            }
        }
        Ok(())
    }

    /// Returns false when the operator asked to quit.
    fn handle_line(&self, worker: &PollingHandle, line: &str) -> bool {
        let input = line.trim();
        if input.is_empty() {
            return true;
        }
        if input.eq_ignore_ascii_case("q") || input.eq_ignore_ascii_case("quit") {
            return false;
        }
        match self.config.key_index(input) {
            Some(index) => {
                let duration_ms = self.config.key_press_duration_ms;
                if let Err(err) = worker.request_key_press(index, duration_ms) {
                    warn!("key press not queued: {err}");
                }
            }
            None => warn!("unknown key '{input}'; enter 0-7, a key label, or q to quit"),
        }
        true
    }
}

fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = channel::unbounded();
    thread::Builder::new()
        .name("vmclink-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        })?;
    Ok(rx)
}
