//! External tool provisioning.
//!
//! A [`Provisioner`] owns the tool table and the installed-tool cache for the
//! lifetime of the process. Checks call [`Provisioner::ensure_installed`]
//! before they spawn a tool; installs are retried on transient network
//! failures and bounded by the configured install timeout.

mod catalog;
mod retry;

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::Duration;

use owo_colors::OwoColorize;

pub use catalog::{default_tools, version_var, InstallMethod, Tool, LATEST};
pub use retry::{classify, is_network_error, retry_with_backoff, AttemptError, FailureClass, RetryError, RetryPolicy};

use crate::context::{ContextError, RunContext};
use crate::errors::{TimeoutError, ToolError};
use crate::progress::{install_progress, ProgressOptions, Tracker, DEFAULT_INTERVAL};
use crate::runner::{find_in_path, CommandCall, CommandRunner, RealCommandRunner};
use crate::timing::{fmt_duration, Stopwatch};

/// Resolves a binary name to a runnable path.
pub trait BinaryLocator: Send + Sync {
    fn locate(&self, binary: &str) -> Option<PathBuf>;
}

/// `PATH` lookup that also covers where `go install` puts binaries.
#[derive(Debug, Clone, Default)]
pub struct PathLocator {
    extra_dirs: Vec<PathBuf>,
}

impl PathLocator {
    pub fn new(extra_dirs: Vec<PathBuf>) -> Self {
        Self { extra_dirs }
    }

    /// `$GOBIN`, `$GOPATH/bin` and `~/go/bin`.
    pub fn from_env() -> Self {
        let mut dirs = Vec::new();
        if let Some(gobin) = env::var_os("GOBIN").filter(|v| !v.is_empty()) {
            dirs.push(PathBuf::from(gobin));
        }
        if let Some(gopath) = env::var_os("GOPATH").filter(|v| !v.is_empty()) {
            dirs.extend(env::split_paths(&gopath).map(|p| p.join("bin")));
        }
        if let Some(home) = env::var_os("HOME").filter(|v| !v.is_empty()) {
            dirs.push(PathBuf::from(home).join("go").join("bin"));
        }
        Self::new(dirs)
    }
}

impl BinaryLocator for PathLocator {
    fn locate(&self, binary: &str) -> Option<PathBuf> {
        find_in_path(binary, &self.extra_dirs)
    }
}

#[derive(Debug, Clone)]
pub struct InstallSettings {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub progress_interval: Duration,
    /// Silences install notices and progress lines.
    pub quiet: bool,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            progress_interval: DEFAULT_INTERVAL,
            quiet: false,
        }
    }
}

pub struct Provisioner {
    tools: RwLock<BTreeMap<String, Tool>>,
    installed: RwLock<HashMap<String, bool>>,
    install_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    settings: InstallSettings,
    runner: Arc<dyn CommandRunner>,
    locator: Arc<dyn BinaryLocator>,
}

impl Provisioner {
    pub fn new(
        tools: Vec<Tool>,
        settings: InstallSettings,
        runner: Arc<dyn CommandRunner>,
        locator: Arc<dyn BinaryLocator>,
    ) -> Self {
        Self {
            tools: RwLock::new(tools.into_iter().map(|t| (t.name.clone(), t)).collect()),
            installed: RwLock::new(HashMap::new()),
            install_locks: Mutex::new(HashMap::new()),
            settings,
            runner,
            locator,
        }
    }

    /// Default tool table, real subprocesses, `PATH` plus Go bin dirs.
    pub fn with_defaults(settings: InstallSettings) -> Self {
        Self::new(
            default_tools(),
            settings,
            Arc::new(RealCommandRunner),
            Arc::new(PathLocator::from_env()),
        )
    }

    pub fn settings(&self) -> &InstallSettings {
        &self.settings
    }

    pub fn tool(&self, name: &str) -> Option<Tool> {
        read(&self.tools).get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        read(&self.tools).keys().cloned().collect()
    }

    /// Override versions by tool name. Empty values keep the default.
    pub fn apply_versions(&self, versions: &BTreeMap<String, String>) {
        let mut tools = write(&self.tools);
        for (name, version) in versions {
            let version = version.trim();
            if version.is_empty() {
                continue;
            }
            if let Some(tool) = tools.get_mut(name) {
                tool.version = version.to_string();
            }
        }
    }

    /// Cached verdict for `name`; the first lookup resolves the binary.
    pub fn is_installed(&self, name: &str) -> bool {
        if let Some(&installed) = read(&self.installed).get(name) {
            return installed;
        }

        let Some(binary) = read(&self.tools).get(name).map(|t| t.binary.clone()) else {
            return false;
        };
        let found = self.locator.locate(&binary).is_some();
        tracing::debug!(tool = name, found, "resolved tool binary");

        // A concurrent resolver may have won; keep its verdict.
        *write(&self.installed).entry(name.to_string()).or_insert(found)
    }

    pub fn ensure_installed(&self, ctx: &RunContext, name: &str) -> Result<(), ToolError> {
        if self.is_installed(name) {
            return Ok(());
        }
        let tool = self
            .tool(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        self.install_tool(ctx, &tool)
    }

    pub fn install_tool(&self, ctx: &RunContext, tool: &Tool) -> Result<(), ToolError> {
        let tool_lock = self.install_lock(&tool.name);
        let _held = lock(&tool_lock);

        if self.locator.locate(&tool.binary).is_some() {
            self.mark_installed(&tool.name);
            return Ok(());
        }
        if let Some(reason) = ctx.err() {
            return Err(ToolError::Canceled {
                tool: tool.name.clone(),
                reason,
            });
        }

        self.notice(format!(
            "{} Installing {}@{}...",
            "→".yellow(),
            tool.name,
            tool.resolved_version()
        ));
        tracing::info!(tool = %tool.name, version = tool.resolved_version(), "installing tool");

        let timeout = self.settings.timeout;
        let install_ctx = ctx.with_timeout(timeout);
        let tracker = Tracker::new(ProgressOptions {
            operation: "Tool installation".to_string(),
            context: tool.name.clone(),
            timeout,
            interval: self.settings.progress_interval,
            formatter: Some(install_progress(&tool.name)),
            suppress_output: self.settings.quiet,
        });
        tracker.start(&install_ctx);

        let stopwatch = Stopwatch::start();
        let outcome = self.run_install(&install_ctx, tool);
        tracker.stop();
        let elapsed = stopwatch.elapsed();

        if let Err(failure) = outcome {
            return Err(self.install_error(&install_ctx, tool, failure, elapsed));
        }

        if self.locator.locate(&tool.binary).is_none() {
            return Err(ToolError::NotInPath(tool.name.clone()));
        }
        self.mark_installed(&tool.name);
        self.notice(format!(
            "{} Successfully installed {} ({})",
            "✓".green(),
            tool.name,
            fmt_duration(elapsed)
        ));
        Ok(())
    }

    /// Install every registered tool concurrently, reporting all failures.
    pub fn install_all_tools(&self, ctx: &RunContext) -> Result<(), ToolError> {
        let names = self.tool_names();
        let mut failures: Vec<(String, ToolError)> = thread::scope(|scope| {
            let handles: Vec<_> = names
                .iter()
                .map(|name| (name, scope.spawn(move || self.ensure_installed(ctx, name))))
                .collect();
            handles
                .into_iter()
                .filter_map(|(name, handle)| match handle.join() {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => Some((name.clone(), err)),
                    Err(_) => Some((
                        name.clone(),
                        ToolError::InstallFailed {
                            tool: name.clone(),
                            attempts: 0,
                            class: FailureClass::Permanent,
                            message: "installer thread panicked".to_string(),
                            output: String::new(),
                        },
                    )),
                })
                .collect()
        });

        if failures.is_empty() {
            return Ok(());
        }
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        Err(ToolError::InstallAll(failures))
    }

    /// Forget every cached verdict.
    pub fn clean_cache(&self) {
        write(&self.installed).clear();
    }

    pub fn tool_path(&self, name: &str) -> Option<PathBuf> {
        let binary = read(&self.tools).get(name).map(|t| t.binary.clone())?;
        self.locator.locate(&binary)
    }

    fn run_install(&self, ctx: &RunContext, tool: &Tool) -> Result<(), InstallFailure> {
        let primary = self
            .attempt(ctx, &format!("installing {}", tool.name), &tool.install_call())
            .map_err(InstallFailure::Primary);

        let failure = match primary {
            Err(InstallFailure::Primary(failure)) if failure.class == FailureClass::NetworkTransient => failure,
            other => return other,
        };
        let Some(fallback_call) = tool.fallback_call() else {
            return Err(InstallFailure::Primary(failure));
        };

        self.notice(format!(
            "{} Primary installation failed with network error, trying fallback method...",
            "⚠".yellow()
        ));
        tracing::warn!(tool = %tool.name, error = %failure.last, "primary install exhausted retries, using fallback");

        let stopwatch = Stopwatch::start();
        match self.attempt(ctx, &format!("installing {} (fallback)", tool.name), &fallback_call) {
            Ok(()) => {
                self.notice(format!(
                    "{} Installed {} using fallback method (took {})",
                    "⚠".yellow(),
                    tool.name,
                    fmt_duration(stopwatch.elapsed())
                ));
                Ok(())
            }
            Err(fallback) => Err(InstallFailure::Fallback {
                primary: failure,
                fallback,
            }),
        }
    }

    fn attempt(&self, ctx: &RunContext, operation: &str, call: &CommandCall) -> Result<(), RetryError> {
        let policy = self.settings.retry;
        retry_with_backoff(
            ctx,
            &policy,
            |_| match self.runner.run(ctx, call) {
                Ok(result) if result.success() => Ok(()),
                Ok(result) => Err(AttemptError::Exit {
                    status: result.status,
                    output: result.combined(),
                }),
                Err(err) => Err(AttemptError::Exec(err)),
            },
            |next, delay, err| {
                tracing::warn!(operation, attempt = next, ?delay, error = %err, "retrying after network error");
                self.notice(format!(
                    "{} Retrying {} (attempt {}/{})...",
                    "⚠".yellow(),
                    operation,
                    next,
                    policy.attempts
                ));
            },
        )
    }

    fn install_error(&self, install_ctx: &RunContext, tool: &Tool, failure: InstallFailure, elapsed: Duration) -> ToolError {
        match install_ctx.err() {
            Some(ContextError::DeadlineExceeded) => {
                return ToolError::Timeout(TimeoutError::tool_install(&tool.name, self.settings.timeout, elapsed));
            }
            Some(reason @ ContextError::Canceled) => {
                return ToolError::Canceled {
                    tool: tool.name.clone(),
                    reason,
                };
            }
            None => {}
        }

        match failure {
            InstallFailure::Primary(failure) if failure.class == FailureClass::Timeout => {
                ToolError::Timeout(TimeoutError::tool_install(&tool.name, self.settings.timeout, elapsed))
            }
            InstallFailure::Primary(failure) => ToolError::InstallFailed {
                tool: tool.name.clone(),
                attempts: failure.attempts,
                class: failure.class,
                message: failure.last.to_string(),
                output: failure.last.output().to_string(),
            },
            InstallFailure::Fallback { primary, fallback } => ToolError::FallbackFailed {
                tool: tool.name.clone(),
                primary: primary.last.to_string(),
                primary_output: primary.last.output().to_string(),
                fallback: fallback.last.to_string(),
                fallback_output: fallback.last.output().to_string(),
            },
        }
    }

    fn install_lock(&self, name: &str) -> Arc<Mutex<()>> {
        Arc::clone(lock(&self.install_locks).entry(name.to_string()).or_default())
    }

    fn mark_installed(&self, name: &str) {
        write(&self.installed).insert(name.to_string(), true);
    }

    fn notice(&self, line: String) {
        if !self.settings.quiet {
            println!("{line}");
        }
    }
}

enum InstallFailure {
    Primary(RetryError),
    Fallback { primary: RetryError, fallback: RetryError },
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CommandResult, ExecError};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Locator backed by a set of "present" binaries that counts lookups.
    #[derive(Default)]
    struct FakeLocator {
        present: Mutex<HashSet<String>>,
        lookups: AtomicUsize,
    }

    impl FakeLocator {
        fn with(binaries: &[&str]) -> Self {
            Self {
                present: Mutex::new(binaries.iter().map(|b| b.to_string()).collect()),
                lookups: AtomicUsize::new(0),
            }
        }

        fn add(&self, binary: &str) {
            self.present.lock().unwrap().insert(binary.to_string());
        }
    }

    impl BinaryLocator for FakeLocator {
        fn locate(&self, binary: &str) -> Option<PathBuf> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.present
                .lock()
                .unwrap()
                .contains(binary)
                .then(|| PathBuf::from("/fake/bin").join(binary))
        }
    }

    /// Runner that replays one scripted outcome for every call.
    struct ScriptedRunner {
        calls: Mutex<Vec<CommandCall>>,
        respond: Box<dyn Fn(&RunContext, &CommandCall) -> Result<CommandResult, ExecError> + Send + Sync>,
    }

    impl ScriptedRunner {
        fn new(
            respond: impl Fn(&RunContext, &CommandCall) -> Result<CommandResult, ExecError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            }
        }

        fn calls(&self) -> Vec<CommandCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, ctx: &RunContext, command: &CommandCall) -> Result<CommandResult, ExecError> {
            self.calls.lock().unwrap().push(command.clone());
            (self.respond)(ctx, command)
        }
    }

    fn failing(output: &str) -> CommandResult {
        CommandResult {
            status: 1,
            stdout: String::new(),
            stderr: output.to_string(),
        }
    }

    fn settings() -> InstallSettings {
        InstallSettings {
            timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                attempts: 3,
                base_delay: Duration::from_millis(1),
            },
            progress_interval: Duration::from_secs(10),
            quiet: true,
        }
    }

    fn provisioner(runner: Arc<ScriptedRunner>, locator: Arc<FakeLocator>) -> Provisioner {
        Provisioner::new(default_tools(), settings(), runner, locator)
    }

    #[test]
    fn is_installed_caches_the_first_lookup() {
        let locator = Arc::new(FakeLocator::with(&["gofumpt"]));
        let runner = Arc::new(ScriptedRunner::new(|_, _| Ok(failing(""))));
        let p = provisioner(runner, Arc::clone(&locator));

        assert!(p.is_installed("gofumpt"));
        assert!(p.is_installed("gofumpt"));
        assert_eq!(locator.lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_tool_is_not_installed_and_not_looked_up() {
        let locator = Arc::new(FakeLocator::default());
        let runner = Arc::new(ScriptedRunner::new(|_, _| Ok(failing(""))));
        let p = provisioner(runner, Arc::clone(&locator));

        assert!(!p.is_installed("toolX"));
        assert_eq!(locator.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clean_cache_forces_a_new_lookup() {
        let locator = Arc::new(FakeLocator::default());
        let runner = Arc::new(ScriptedRunner::new(|_, _| Ok(failing(""))));
        let p = provisioner(runner, Arc::clone(&locator));

        assert!(!p.is_installed("goimports"));
        locator.add("goimports");
        assert!(!p.is_installed("goimports"));
        p.clean_cache();
        assert!(p.is_installed("goimports"));
    }

    #[test]
    fn ensure_installed_rejects_unknown_tools() {
        let runner = Arc::new(ScriptedRunner::new(|_, _| Ok(failing(""))));
        let p = provisioner(Arc::clone(&runner), Arc::new(FakeLocator::default()));
        let err = p.ensure_installed(&RunContext::background(), "nope").unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(name) if name == "nope"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn successful_install_marks_tool_installed() {
        let locator = Arc::new(FakeLocator::default());
        let installed = Arc::clone(&locator);
        let runner = Arc::new(ScriptedRunner::new(move |_, _| {
            installed.add("gofumpt");
            Ok(CommandResult {
                status: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }));
        let p = provisioner(Arc::clone(&runner), locator);

        p.ensure_installed(&RunContext::background(), "gofumpt").unwrap();
        assert!(p.is_installed("gofumpt"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, vec!["install", "mvdan.cc/gofumpt@v0.8.0"]);
    }

    #[test]
    fn install_that_leaves_no_binary_is_not_in_path() {
        let runner = Arc::new(ScriptedRunner::new(|_, _| {
            Ok(CommandResult {
                status: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }));
        let p = provisioner(runner, Arc::new(FakeLocator::default()));
        let err = p.ensure_installed(&RunContext::background(), "goimports").unwrap_err();
        assert!(matches!(err, ToolError::NotInPath(_)));
    }

    #[test]
    fn network_failures_use_every_attempt() {
        let runner = Arc::new(ScriptedRunner::new(|_, _| Ok(failing("dial tcp: lookup proxy.golang.org: no such host"))));
        let p = provisioner(Arc::clone(&runner), Arc::new(FakeLocator::default()));

        let err = p.ensure_installed(&RunContext::background(), "gofumpt").unwrap_err();
        assert_eq!(runner.calls().len(), 3);
        match &err {
            ToolError::InstallFailed { attempts, class, .. } => {
                assert_eq!(*attempts, 3);
                assert_eq!(*class, FailureClass::NetworkTransient);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("no such host"));
    }

    #[test]
    fn permanent_failure_is_not_retried() {
        let runner = Arc::new(ScriptedRunner::new(|_, _| Ok(failing("invalid version: unknown revision"))));
        let p = provisioner(Arc::clone(&runner), Arc::new(FakeLocator::default()));

        let err = p.ensure_installed(&RunContext::background(), "gofumpt").unwrap_err();
        assert_eq!(runner.calls().len(), 1);
        assert!(matches!(err, ToolError::InstallFailed { class: FailureClass::Permanent, .. }));
    }

    #[test]
    fn script_install_falls_back_to_go_install() {
        let locator = Arc::new(FakeLocator::default());
        let installed = Arc::clone(&locator);
        let runner = Arc::new(ScriptedRunner::new(move |_, call| {
            if call.program == "sh" {
                Ok(failing("curl: (7) Failed to connect: Connection refused"))
            } else {
                installed.add("golangci-lint");
                Ok(CommandResult {
                    status: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
        }));
        let p = provisioner(Arc::clone(&runner), locator);

        p.ensure_installed(&RunContext::background(), "golangci-lint").unwrap();
        let programs: Vec<_> = runner.calls().into_iter().map(|c| c.program).collect();
        assert_eq!(programs, vec!["sh", "sh", "sh", "go"]);
    }

    #[test]
    fn fallback_failure_carries_both_outputs() {
        let runner = Arc::new(ScriptedRunner::new(|_, call| {
            if call.program == "sh" {
                Ok(failing("curl: connection reset"))
            } else {
                Ok(failing("go: module lookup disabled"))
            }
        }));
        let p = provisioner(runner, Arc::new(FakeLocator::default()));

        let err = p.ensure_installed(&RunContext::background(), "golangci-lint").unwrap_err();
        match &err {
            ToolError::FallbackFailed {
                primary_output,
                fallback_output,
                ..
            } => {
                assert!(primary_output.contains("connection reset"));
                assert!(fallback_output.contains("module lookup disabled"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn hanging_install_is_a_timeout() {
        let runner = Arc::new(ScriptedRunner::new(|ctx, call| {
            let reason = ctx.sleep(Duration::from_secs(30)).unwrap_err();
            Err(ExecError::Interrupted {
                program: call.program.clone(),
                reason,
                output: String::new(),
            })
        }));
        let mut install = settings();
        install.timeout = Duration::from_millis(100);
        let p = Provisioner::new(default_tools(), install, runner, Arc::new(FakeLocator::default()));

        let err = p.ensure_installed(&RunContext::background(), "gofumpt").unwrap_err();
        match err {
            ToolError::Timeout(timeout) => {
                assert_eq!(timeout.timeout, Duration::from_millis(100));
                assert_eq!(timeout.context, "gofumpt");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn canceled_context_skips_installation() {
        let runner = Arc::new(ScriptedRunner::new(|_, _| Ok(failing(""))));
        let p = provisioner(Arc::clone(&runner), Arc::new(FakeLocator::default()));
        let ctx = RunContext::background();
        ctx.cancel();

        let err = p.ensure_installed(&ctx, "gofumpt").unwrap_err();
        assert!(matches!(err, ToolError::Canceled { .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn install_all_reports_every_failed_tool() {
        let locator = Arc::new(FakeLocator::with(&["goimports"]));
        let installed = Arc::clone(&locator);
        let runner = Arc::new(ScriptedRunner::new(move |_, call| {
            if call.args.iter().any(|a| a.starts_with("mvdan.cc/gofumpt")) {
                installed.add("gofumpt");
                Ok(CommandResult {
                    status: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            } else {
                Ok(failing("permission denied"))
            }
        }));
        let p = provisioner(runner, locator);

        let err = p.install_all_tools(&RunContext::background()).unwrap_err();
        assert_eq!(err.failed_tools(), vec!["gitleaks", "golangci-lint"]);
        assert!(p.is_installed("gofumpt"));
    }

    #[test]
    fn apply_versions_overrides_defaults() {
        let runner = Arc::new(ScriptedRunner::new(|_, _| Ok(failing(""))));
        let p = provisioner(runner, Arc::new(FakeLocator::default()));
        let versions = BTreeMap::from([
            ("gofumpt".to_string(), "v0.7.0".to_string()),
            ("goimports".to_string(), "  ".to_string()),
            ("unknown".to_string(), "v1".to_string()),
        ]);
        p.apply_versions(&versions);
        assert_eq!(p.tool("gofumpt").unwrap().version, "v0.7.0");
        assert_eq!(p.tool("goimports").unwrap().version, "latest");
    }

    #[test]
    fn tool_path_uses_the_locator() {
        let runner = Arc::new(ScriptedRunner::new(|_, _| Ok(failing(""))));
        let p = provisioner(runner, Arc::new(FakeLocator::with(&["gitleaks"])));
        assert_eq!(p.tool_path("gitleaks"), Some(PathBuf::from("/fake/bin/gitleaks")));
        assert_eq!(p.tool_path("gofumpt"), None);
        assert_eq!(p.tool_path("missing"), None);
    }
}
