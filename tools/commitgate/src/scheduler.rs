//! Check scheduling.
//!
//! [`Runner::run`] turns a set of registered checks and a list of files into
//! [`Results`]: it computes which checks are eligible, provisions their tools,
//! and executes them on a bounded pool of worker threads under a global and a
//! per-check deadline.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::checks::{Check, RegisteredCheck, Registry};
use crate::config::{Config, GLOBAL_TIMEOUT_VAR};
use crate::context::{ContextError, RunContext};
use crate::errors::{CheckError, RunError, TimeoutError, ToolError};
use crate::results::{Aggregator, CheckResult, CheckStatus, Results};
use crate::timing::Stopwatch;
use crate::tools::Provisioner;

/// Environment variables holding a comma-separated skip list, by precedence.
pub const SKIP_VARS: [&str; 2] = ["SKIP", "COMMITGATE_SKIP"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckEvent {
    Running,
    Finished(CheckStatus),
}

pub type ProgressCallback = Arc<dyn Fn(&str, CheckEvent, Duration) + Send + Sync>;

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Per-invocation parameters.
#[derive(Clone, Default)]
pub struct RunOptions {
    pub files: Vec<String>,
    /// Worker count; `0` uses every available CPU.
    pub parallel: usize,
    pub only_checks: Vec<String>,
    pub skip_checks: Vec<String>,
    pub fail_fast: bool,
    pub graceful_degradation: bool,
    pub on_progress: Option<ProgressCallback>,
}

impl RunOptions {
    /// Defaults taken from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            parallel: config.parallel_workers,
            fail_fast: config.fail_fast,
            graceful_degradation: config.graceful_degradation,
            ..Self::default()
        }
    }
}

struct Planned<'a> {
    entry: &'a RegisteredCheck,
    files: Vec<String>,
    timeout: Duration,
}

impl Planned<'_> {
    fn name(&self) -> &str {
        &self.entry.descriptor.name
    }
}

pub struct Runner {
    config: Config,
    registry: Registry,
    provisioner: Arc<Provisioner>,
    env: EnvLookup,
}

impl Runner {
    pub fn new(config: Config, registry: Registry, provisioner: Arc<Provisioner>) -> Self {
        Self {
            config,
            registry,
            provisioner,
            env: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Replace the process environment used for the skip variables.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn provisioner(&self) -> &Arc<Provisioner> {
        &self.provisioner
    }

    /// CLI skips unioned with the first non-empty skip variable.
    pub fn skip_set(&self, options: &RunOptions) -> BTreeSet<String> {
        let mut skip: BTreeSet<String> = options
            .skip_checks
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        let from_env = SKIP_VARS
            .iter()
            .filter_map(|var| (self.env)(var))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty());
        if let Some(value) = from_env {
            if value.eq_ignore_ascii_case("all") {
                skip.extend(self.registry.names().into_iter().map(str::to_string));
            } else {
                skip.extend(parse_skip_list(&value));
            }
        }
        skip
    }

    /// Names of the checks a run with `options` would dispatch, in registry order.
    pub fn eligible_checks(&self, options: &RunOptions) -> Vec<String> {
        let files = exclude_files(&options.files, &self.config.exclude_patterns);
        self.plan(&files, options)
            .iter()
            .map(|planned| planned.name().to_string())
            .collect()
    }

    fn plan(&self, files: &[String], options: &RunOptions) -> Vec<Planned<'_>> {
        let skip = self.skip_set(options);
        self.registry
            .iter()
            .filter(|entry| entry.descriptor.enabled)
            .filter(|entry| !skip.contains(&entry.descriptor.name))
            .filter(|entry| options.only_checks.is_empty() || options.only_checks.contains(&entry.descriptor.name))
            .filter_map(|entry| {
                let matched = entry.check.filter_files(files);
                if matched.is_empty() {
                    return None;
                }
                let timeout = if entry.descriptor.timeout.is_zero() {
                    self.config.timeout
                } else {
                    entry.descriptor.timeout
                };
                Some(Planned {
                    entry,
                    files: matched,
                    timeout,
                })
            })
            .collect()
    }

    fn validate(&self, options: &RunOptions) -> Result<(), RunError> {
        let unknown: Vec<&str> = options
            .only_checks
            .iter()
            .filter(|name| self.registry.get(name).is_none())
            .map(String::as_str)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(RunError::InvalidOptions(format!("unknown check(s): {}", unknown.join(", "))))
        }
    }

    /// Execute every eligible check and aggregate their results.
    ///
    /// Per-check failures are reported inside [`Results`]; an `Err` means the
    /// run never dispatched anything.
    pub fn run(&self, ctx: &RunContext, options: &RunOptions) -> Result<Results, RunError> {
        let stopwatch = Stopwatch::start();
        if let Some(reason) = ctx.err() {
            return Err(RunError::Canceled(reason));
        }
        self.validate(options)?;

        let files = exclude_files(&options.files, &self.config.exclude_patterns);
        let plan = self.plan(&files, options);
        if plan.is_empty() {
            return Err(RunError::NoChecksToRun);
        }

        let workers = worker_count(options.parallel, plan.len());
        info!(
            checks = plan.len(),
            workers,
            files = files.len(),
            fail_fast = options.fail_fast,
            "running checks"
        );

        let run_ctx = ctx.with_timeout(self.config.timeout);
        let aggregator = Aggregator::new();
        let next = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let write_lock = Mutex::new(());

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = aggregator.sender();
                let (plan, next, skipped, run_ctx, write_lock) = (&plan, &next, &skipped, &run_ctx, &write_lock);
                scope.spawn(move || loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(planned) = plan.get(index) else {
                        break;
                    };
                    if run_ctx.is_done() {
                        debug!(check = planned.name(), "not started, run is done");
                        skipped.fetch_add(1, Ordering::SeqCst);
                        continue;
                    }
                    let result = self.execute(ctx, run_ctx, write_lock, planned, options);
                    if options.fail_fast && !result.success && result.status != CheckStatus::Canceled {
                        warn!(check = planned.name(), "fail-fast: canceling remaining checks");
                        run_ctx.cancel();
                    }
                    tx.send((index, result)).ok();
                });
            }
        });

        let results = aggregator.finish(stopwatch.elapsed(), files.len(), skipped.into_inner());
        info!(
            passed = results.passed,
            failed = results.failed,
            skipped = results.skipped,
            duration_ms = results.total_duration.as_millis() as u64,
            "checks finished"
        );
        Ok(results)
    }

    fn execute(
        &self,
        caller: &RunContext,
        run_ctx: &RunContext,
        write_lock: &Mutex<()>,
        planned: &Planned<'_>,
        options: &RunOptions,
    ) -> CheckResult {
        let name = planned.name();
        notify(options, name, CheckEvent::Running, Duration::ZERO);
        debug!(check = name, files = planned.files.len(), timeout_ms = planned.timeout.as_millis() as u64, "check started");

        let stopwatch = Stopwatch::start();
        let mut check_ctx = None;
        let outcome = match self.provision(run_ctx, planned.entry.check.as_ref()) {
            Ok(()) => {
                let scoped = run_ctx.with_timeout(planned.timeout);
                // Checks that rewrite files in place take turns.
                let _guard = planned
                    .entry
                    .check
                    .mutates_files()
                    .then(|| write_lock.lock().unwrap_or_else(PoisonError::into_inner));
                let outcome = planned.entry.check.run(&scoped, &planned.files);
                check_ctx = Some(scoped);
                outcome
            }
            Err(err) => Err(err),
        };
        let duration = stopwatch.elapsed();

        let result = match outcome {
            Ok(()) => CheckResult::passed(name, duration, planned.files.len()),
            Err(err) => self.failure(caller, run_ctx, check_ctx.as_ref(), planned, err, duration, options.graceful_degradation),
        };
        debug!(check = name, status = result.status.label(), duration_ms = duration.as_millis() as u64, "check finished");
        notify(options, name, CheckEvent::Finished(result.status), duration);
        result
    }

    fn provision(&self, ctx: &RunContext, check: &dyn Check) -> Result<(), CheckError> {
        match check.required_tool() {
            Some(tool) => self
                .provisioner
                .ensure_installed(ctx, tool)
                .map_err(CheckError::Provisioning),
            None => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn failure(
        &self,
        caller: &RunContext,
        run_ctx: &RunContext,
        check_ctx: Option<&RunContext>,
        planned: &Planned<'_>,
        err: CheckError,
        duration: Duration,
        graceful: bool,
    ) -> CheckResult {
        let mut result = CheckResult {
            success: false,
            status: CheckStatus::Failed,
            error: Some(err.to_string()),
            suggestion: err.suggestion(),
            command: err.command().map(str::to_string),
            output: err.output().map(str::to_string),
            ..CheckResult::passed(planned.name(), duration, planned.files.len())
        };

        match &err {
            CheckError::Canceled(_) | CheckError::Provisioning(ToolError::Canceled { .. }) => {
                match self.deadline_hit(caller, run_ctx, check_ctx, planned, duration) {
                    Some(timeout) => {
                        result.status = CheckStatus::TimedOut;
                        result.suggestion = Some(timeout.suggestion());
                        result.error = Some(timeout.to_string());
                    }
                    None => result.status = CheckStatus::Canceled,
                }
            }
            CheckError::Timeout(_) | CheckError::Provisioning(ToolError::Timeout(_)) => {
                result.status = CheckStatus::TimedOut;
            }
            _ if graceful && err.can_skip() => {
                warn!(check = planned.name(), error = %err, "tool unavailable, continuing");
                result.success = true;
                result.status = CheckStatus::Passed;
                result.degraded = true;
            }
            _ => {}
        }
        result
    }

    /// Which deadline, if any, interrupted a check. `None` means it was canceled.
    fn deadline_hit(
        &self,
        caller: &RunContext,
        run_ctx: &RunContext,
        check_ctx: Option<&RunContext>,
        planned: &Planned<'_>,
        elapsed: Duration,
    ) -> Option<TimeoutError> {
        if caller.is_done() {
            return None;
        }
        match run_ctx.err() {
            Some(ContextError::DeadlineExceeded) => {
                return Some(TimeoutError::check(planned.name(), self.config.timeout, elapsed, GLOBAL_TIMEOUT_VAR));
            }
            Some(ContextError::Canceled) => return None,
            None => {}
        }
        match check_ctx.and_then(RunContext::err) {
            Some(ContextError::DeadlineExceeded) => Some(TimeoutError::check(
                planned.name(),
                planned.timeout,
                elapsed,
                &planned.entry.descriptor.timeout_var,
            )),
            _ => None,
        }
    }
}

fn notify(options: &RunOptions, name: &str, event: CheckEvent, duration: Duration) {
    if let Some(callback) = &options.on_progress {
        callback(name, event, duration);
    }
}

/// Split a skip value on commas, trimming and dropping empty entries.
pub fn parse_skip_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// `vendor/` matches by prefix or anywhere in the path; anything else by substring.
pub fn is_excluded(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        if pattern.is_empty() {
            false
        } else if pattern.ends_with('/') {
            path.starts_with(pattern.as_str()) || path.contains(pattern.as_str())
        } else {
            path.contains(pattern.as_str())
        }
    })
}

pub fn exclude_files(files: &[String], patterns: &[String]) -> Vec<String> {
    files.iter().filter(|f| !is_excluded(f, patterns)).cloned().collect()
}

/// `parallel`, or the CPU count when zero, clamped to `1..=eligible`.
pub fn worker_count(parallel: usize, eligible: usize) -> usize {
    let requested = if parallel > 0 { parallel } else { num_cpus::get() };
    requested.clamp(1, eligible.max(1))
}
