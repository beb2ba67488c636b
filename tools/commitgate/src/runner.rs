use std::env;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use wait_timeout::ChildExt;

use crate::context::{ContextError, RunContext, POLL_INTERVAL};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandCall {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// stdout followed by stderr, the way a terminal would show them.
    pub fn combined(&self) -> String {
        let mut merged = self.stdout.clone();
        merged.push_str(&self.stderr);
        merged
    }
}

/// Subprocess failures that are not a plain non-zero exit.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} terminated: {reason}")]
    Interrupted {
        program: String,
        reason: ContextError,
        output: String,
    },
}

impl ExecError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ExecError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    pub fn context_error(&self) -> Option<ContextError> {
        match self {
            ExecError::Interrupted { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    pub fn output(&self) -> &str {
        match self {
            ExecError::Interrupted { output, .. } => output,
            _ => "",
        }
    }
}

/// Seam between the engine and real subprocesses.
pub trait CommandRunner: Send + Sync {
    fn run(&self, ctx: &RunContext, command: &CommandCall) -> Result<CommandResult, ExecError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RealCommandRunner;

impl CommandCall {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Self::default()
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn to_vec(&self) -> Vec<String> {
        let mut parts = Vec::with_capacity(1 + self.args.len());
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts
    }

    /// Printable command line, used in error messages.
    pub fn display(&self) -> String {
        self.to_vec().join(" ")
    }
}

impl CommandRunner for RealCommandRunner {
    fn run(&self, ctx: &RunContext, command: &CommandCall) -> Result<CommandResult, ExecError> {
        if let Some(reason) = ctx.err() {
            return Err(ExecError::Interrupted {
                program: command.program.clone(),
                reason,
                output: String::new(),
            });
        }

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = command.current_dir.as_deref() {
            process.current_dir(dir);
        }
        for (key, value) in &command.env {
            process.env(key, value);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            process.process_group(0);
        }

        let mut child = process.spawn().map_err(|source| ExecError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let writer = match (command.stdin.clone(), child.stdin.take()) {
            (Some(input), Some(mut pipe)) => Some(thread::spawn(move || {
                let _ = pipe.write_all(input.as_bytes());
            })),
            _ => None,
        };
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let waited = wait_with_context(ctx, &mut child, &command.program);
        if let Some(handle) = writer {
            let _ = handle.join();
        }
        let stdout = collect(stdout);
        let stderr = collect(stderr);

        match waited {
            Ok(status) => Ok(CommandResult {
                status: status.code().unwrap_or(1),
                stdout,
                stderr,
            }),
            Err(WaitFailure::Interrupted(reason)) => Err(ExecError::Interrupted {
                program: command.program.clone(),
                reason,
                output: stdout + &stderr,
            }),
            Err(WaitFailure::Io(source)) => Err(ExecError::Wait {
                program: command.program.clone(),
                source,
            }),
        }
    }
}

enum WaitFailure {
    Interrupted(ContextError),
    Io(io::Error),
}

fn wait_with_context(ctx: &RunContext, child: &mut Child, program: &str) -> Result<ExitStatus, WaitFailure> {
    loop {
        match child.wait_timeout(POLL_INTERVAL) {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if let Some(reason) = ctx.err() {
                    tracing::debug!(program, %reason, pid = child.id(), "terminating subprocess");
                    terminate(child);
                    return Err(WaitFailure::Interrupted(reason));
                }
            }
            Err(err) => {
                terminate(child);
                return Err(WaitFailure::Io(err));
            }
        }
    }
}

/// Kill the child and everything in its process group, then reap it.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        let _ = Command::new("kill")
            .args(["-KILL", "--", &format!("-{}", child.id())])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = reader.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
        .unwrap_or_default()
}

/// Resolve `binary` against `PATH` plus any extra directories.
pub fn find_in_path(binary: &str, extra_dirs: &[PathBuf]) -> Option<PathBuf> {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_dirs = env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default();

    path_dirs
        .iter()
        .chain(extra_dirs.iter())
        .map(|dir| dir.join(binary))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}
