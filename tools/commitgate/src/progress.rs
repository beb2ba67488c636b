use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use owo_colors::OwoColorize;

use crate::context::{RunContext, POLL_INTERVAL};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Elapsed after which install progress switches to "longer than expected".
pub const SLOW_INSTALL_THRESHOLD: Duration = Duration::from_secs(30);

/// Renders a status line from `(elapsed, remaining)`.
pub type ProgressFormatter = Arc<dyn Fn(Duration, Duration) -> String + Send + Sync>;

#[derive(Clone)]
pub struct ProgressOptions {
    /// e.g. "Tool installation"
    pub operation: String,
    /// e.g. the tool or check name
    pub context: String,
    pub timeout: Duration,
    pub interval: Duration,
    pub formatter: Option<ProgressFormatter>,
    pub suppress_output: bool,
}

impl Default for ProgressOptions {
    fn default() -> Self {
        Self {
            operation: String::new(),
            context: String::new(),
            timeout: Duration::ZERO,
            interval: DEFAULT_INTERVAL,
            formatter: None,
            suppress_output: false,
        }
    }
}

struct State {
    started_at: Instant,
    stopped: bool,
    updates: usize,
    last_message: Option<String>,
}

struct Shared {
    operation: String,
    context: String,
    timeout: Duration,
    interval: Duration,
    formatter: ProgressFormatter,
    suppress_output: bool,
    state: Mutex<State>,
}

/// Periodic status line for an operation that may outlive the user's patience.
///
/// `stop` may be called any number of times from any thread; the tracker
/// also stops when dropped or when the governing context ends.
pub struct Tracker {
    shared: Arc<Shared>,
    stop_tx: SyncSender<()>,
    stop_rx: Mutex<Option<Receiver<()>>>,
}

impl Tracker {
    pub fn new(options: ProgressOptions) -> Self {
        let interval = if options.interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            options.interval
        };
        let (stop_tx, stop_rx) = mpsc::sync_channel(1);
        Self {
            shared: Arc::new(Shared {
                operation: options.operation,
                context: options.context,
                timeout: options.timeout,
                interval,
                formatter: options.formatter.unwrap_or_else(|| Arc::new(default_message)),
                suppress_output: options.suppress_output,
                state: Mutex::new(State {
                    started_at: Instant::now(),
                    stopped: false,
                    updates: 0,
                    last_message: None,
                }),
            }),
            stop_tx,
            stop_rx: Mutex::new(Some(stop_rx)),
        }
    }

    /// Begin ticking in the background. A second call is a no-op.
    pub fn start(&self, ctx: &RunContext) {
        let Some(stop_rx) = lock(&self.stop_rx).take() else {
            return;
        };
        lock(&self.shared.state).started_at = Instant::now();

        let shared = Arc::clone(&self.shared);
        let ctx = ctx.clone();
        thread::spawn(move || tick_loop(&shared, &ctx, &stop_rx));
    }

    pub fn stop(&self) {
        let mut state = lock(&self.shared.state);
        if !state.stopped {
            state.stopped = true;
            let _ = self.stop_tx.try_send(());
        }
    }

    pub fn is_stopped(&self) -> bool {
        lock(&self.shared.state).stopped
    }

    pub fn elapsed(&self) -> Duration {
        lock(&self.shared.state).started_at.elapsed()
    }

    /// Number of status lines rendered so far.
    pub fn updates(&self) -> usize {
        lock(&self.shared.state).updates
    }

    pub fn last_message(&self) -> Option<String> {
        lock(&self.shared.state).last_message.clone()
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tick_loop(shared: &Shared, ctx: &RunContext, stop_rx: &Receiver<()>) {
    let mut next_tick = Instant::now() + shared.interval;
    loop {
        let wait = POLL_INTERVAL.min(next_tick.saturating_duration_since(Instant::now()));
        match stop_rx.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }
        if ctx.is_done() {
            return;
        }
        if Instant::now() >= next_tick {
            shared.update();
            next_tick += shared.interval;
        }
    }
}

impl Shared {
    fn update(&self) {
        let mut state = lock(&self.state);
        if state.stopped {
            return;
        }

        let elapsed = state.started_at.elapsed();
        let remaining = self.timeout.saturating_sub(elapsed);
        if remaining.is_zero() {
            // the deadline owner reports the timeout
            return;
        }

        let message = (self.formatter)(elapsed, remaining);
        state.updates += 1;
        state.last_message = Some(message.clone());

        if self.suppress_output {
            return;
        }
        let context = if self.context.is_empty() {
            String::new()
        } else {
            format!(" ({})", self.context)
        };
        println!("{} {}{} - {}", "⏳".cyan(), self.operation, context, message);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn default_message(elapsed: Duration, remaining: Duration) -> String {
    let elapsed = elapsed.as_secs();
    let remaining = remaining.as_secs();
    if remaining > 60 {
        format!(
            "running for {elapsed}s, {}m {}s remaining",
            remaining / 60,
            remaining % 60
        )
    } else {
        format!("running for {elapsed}s, {remaining}s remaining")
    }
}

/// Formatter for tool installs that escalates once the install runs long.
pub fn install_progress(tool: &str) -> ProgressFormatter {
    let tool = tool.to_string();
    Arc::new(move |elapsed: Duration, remaining: Duration| {
        if elapsed < SLOW_INSTALL_THRESHOLD {
            format!(
                "installing {tool}... ({}s elapsed, {}s timeout)",
                elapsed.as_secs(),
                (elapsed + remaining).as_secs()
            )
        } else {
            format!(
                "installing {tool} (this is taking longer than expected)... {}s elapsed, {}s remaining",
                elapsed.as_secs(),
                remaining.as_secs()
            )
        }
    })
}
