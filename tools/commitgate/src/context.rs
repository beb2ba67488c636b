use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Granularity used when a blocking wait has to notice cancellation.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Why a [`RunContext`] is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    Canceled,
    DeadlineExceeded,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::Canceled => write!(f, "context canceled"),
            ContextError::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

impl std::error::Error for ContextError {}

#[derive(Debug)]
struct Inner {
    canceled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<RunContext>,
}

/// Cancellation scope shared by the scheduler, the provisioner and every
/// subprocess they spawn.
///
/// A child context is done when it is canceled, when its own deadline
/// passes, or when any ancestor is done. Cloning shares the same scope.
#[derive(Debug, Clone)]
pub struct RunContext {
    inner: Arc<Inner>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::background()
    }
}

impl RunContext {
    /// Root context with no deadline.
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner {
                canceled: AtomicBool::new(false),
                deadline: None,
                parent: None,
            }),
        }
    }

    /// Cancellable child with the same deadline as `self`.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                canceled: AtomicBool::new(false),
                deadline: None,
                parent: Some(self.clone()),
            }),
        }
    }

    /// Cancellable child that expires after `timeout` or at the parent's
    /// deadline, whichever comes first.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                canceled: AtomicBool::new(false),
                deadline: Instant::now().checked_add(timeout),
                parent: Some(self.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::SeqCst);
    }

    /// Earliest deadline along the ancestor chain.
    pub fn deadline(&self) -> Option<Instant> {
        let parent = self.inner.parent.as_ref().and_then(RunContext::deadline);
        match (self.inner.deadline, parent) {
            (Some(own), Some(parent)) => Some(own.min(parent)),
            (own, parent) => own.or(parent),
        }
    }

    /// Time left before the effective deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn err(&self) -> Option<ContextError> {
        if let Some(parent) = self.inner.parent.as_ref() {
            if let Some(err) = parent.err() {
                return Some(err);
            }
        }
        if self.inner.canceled.load(Ordering::SeqCst) {
            return Some(ContextError::Canceled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Sleep for `duration`, waking early when the context ends.
    pub fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        let until = Instant::now() + duration;
        loop {
            if let Some(err) = self.err() {
                return Err(err);
            }
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL.min(until - now));
        }
    }
}
