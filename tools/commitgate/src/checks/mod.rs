mod builtin;
mod gotools;
mod plugin;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

pub use builtin::{EofCheck, WhitespaceCheck};
pub use gotools::{OutputMode, ToolCheck};
pub use plugin::{expand_env, load_plugins, parse_duration, PluginCheck, PluginManifest, PluginRequest, PluginResponse};

use crate::config::Config;
use crate::context::RunContext;
use crate::errors::CheckError;
use crate::runner::CommandRunner;

/// A named verification unit the scheduler can run.
pub trait Check: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// The subset of `files` this check cares about.
    fn filter_files(&self, files: &[String]) -> Vec<String>;

    /// Tool the provisioner must guarantee before `run`.
    fn required_tool(&self) -> Option<&str> {
        None
    }

    /// Whether `run` rewrites files in place. The scheduler never runs two
    /// such checks at once.
    fn mutates_files(&self) -> bool {
        false
    }

    fn run(&self, ctx: &RunContext, files: &[String]) -> Result<(), CheckError>;
}

/// Which paths a check applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileFilter {
    Any,
    /// `*.go` matches by suffix and `go.mod` by file name or full path.
    /// Other wildcard patterns (`cmd/*.go`, `test_?.py`, `[ab].txt`) are globs
    /// where `*` and `?` stop at `/`.
    Patterns(Vec<String>),
}

enum Matcher<'a> {
    Suffix(&'a str),
    Exact(&'a str),
    Glob { regex: Regex, rooted: bool },
    Never,
}

impl<'a> Matcher<'a> {
    fn compile(pattern: &'a str) -> Self {
        if let Some(suffix) = pattern.strip_prefix('*') {
            if !suffix.contains(['*', '?', '[']) {
                return Matcher::Suffix(suffix);
            }
        }
        if !pattern.contains(['*', '?', '[']) {
            return Matcher::Exact(pattern);
        }
        match glob_regex(pattern) {
            Some(regex) => Matcher::Glob {
                regex,
                rooted: pattern.contains('/'),
            },
            None => {
                tracing::warn!(pattern, "ignoring malformed file pattern");
                Matcher::Never
            }
        }
    }

    fn matches(&self, path: &str, file_name: &str) -> bool {
        match self {
            Matcher::Suffix(suffix) => path.ends_with(suffix),
            Matcher::Exact(name) => file_name == *name || path == *name,
            Matcher::Glob { regex, rooted } => regex.is_match(path) || (!rooted && regex.is_match(file_name)),
            Matcher::Never => false,
        }
    }
}

/// Translate a shell glob into an anchored regex. `None` for an unclosed class.
fn glob_regex(pattern: &str) -> Option<Regex> {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('!' | '^')) {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                let mut empty = true;
                while let Some(c) = chars.next() {
                    match c {
                        ']' if !empty => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            let escaped = chars.next()?;
                            out.push_str(&regex::escape(&escaped.to_string()));
                        }
                        '-' if !empty && chars.peek() != Some(&']') => out.push('-'),
                        _ => out.push_str(&regex::escape(&c.to_string())),
                    }
                    empty = false;
                }
                if !closed {
                    return None;
                }
                out.push(']');
            }
            '\\' => out.push_str(&regex::escape(&chars.next()?.to_string())),
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).ok()
}

impl FileFilter {
    pub fn patterns(patterns: &[&str]) -> Self {
        FileFilter::Patterns(patterns.iter().map(|p| p.to_string()).collect())
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            FileFilter::Any => true,
            FileFilter::Patterns(patterns) => {
                let matchers: Vec<Matcher<'_>> = patterns.iter().map(|p| Matcher::compile(p)).collect();
                matches_any(&matchers, path)
            }
        }
    }

    pub fn filter(&self, files: &[String]) -> Vec<String> {
        match self {
            FileFilter::Any => files.to_vec(),
            FileFilter::Patterns(patterns) => {
                let matchers: Vec<Matcher<'_>> = patterns.iter().map(|p| Matcher::compile(p)).collect();
                files.iter().filter(|f| matches_any(&matchers, f)).cloned().collect()
            }
        }
    }
}

fn matches_any(matchers: &[Matcher<'_>], path: &str) -> bool {
    let file_name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path);
    matchers.iter().any(|m| m.matches(path, file_name))
}

/// Static per-check metadata, fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckDescriptor {
    pub name: String,
    pub enabled: bool,
    /// Zero means "use the global timeout".
    pub timeout: Duration,
    pub timeout_var: String,
}

#[derive(Clone)]
pub struct RegisteredCheck {
    pub descriptor: CheckDescriptor,
    pub check: Arc<dyn Check>,
}

#[derive(Clone, Default)]
pub struct Registry {
    entries: Vec<RegisteredCheck>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a check, replacing any existing entry with the same name.
    pub fn register(&mut self, descriptor: CheckDescriptor, check: Arc<dyn Check>) {
        let entry = RegisteredCheck { descriptor, check };
        match self
            .entries
            .iter_mut()
            .find(|e| e.descriptor.name == entry.descriptor.name)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Built-in checks configured by `config`, plus plugins when enabled.
    pub fn from_config(config: &Config, repo_root: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        let mut registry = Self::new();
        let builtins: Vec<Arc<dyn Check>> = vec![
            Arc::new(WhitespaceCheck::new(repo_root)),
            Arc::new(EofCheck::new(repo_root)),
            Arc::new(ToolCheck::gofmt(repo_root, Arc::clone(&runner))),
            Arc::new(ToolCheck::goimports(repo_root, Arc::clone(&runner))),
            Arc::new(ToolCheck::gofumpt(repo_root, Arc::clone(&runner))),
            Arc::new(ToolCheck::golangci_lint(repo_root, Arc::clone(&runner))),
            Arc::new(ToolCheck::mod_tidy(repo_root, Arc::clone(&runner))),
            Arc::new(ToolCheck::gitleaks(repo_root, Arc::clone(&runner))),
        ];
        for check in builtins {
            let name = check.name().to_string();
            let Some(settings) = config.check(&name) else {
                continue;
            };
            registry.register(
                CheckDescriptor {
                    enabled: settings.enabled,
                    timeout: config.check_timeout(&name),
                    timeout_var: settings.timeout_var.clone(),
                    name,
                },
                check,
            );
        }

        if config.plugins.enabled {
            let directory = resolve(repo_root, &config.plugins.directory);
            let (plugins, errors) = load_plugins(&directory, runner);
            for err in errors {
                tracing::warn!(error = %err, "skipping plugin");
            }
            for plugin in plugins {
                if registry.get(plugin.name()).is_some() {
                    tracing::warn!(plugin = plugin.name(), "plugin name collides with a built-in check, skipping");
                    continue;
                }
                let timeout = plugin.timeout().unwrap_or(config.plugins.timeout);
                registry.register(
                    CheckDescriptor {
                        name: plugin.name().to_string(),
                        enabled: true,
                        timeout,
                        timeout_var: "COMMITGATE_PLUGIN_TIMEOUT".to_string(),
                    },
                    Arc::new(plugin),
                );
            }
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredCheck> {
        self.entries.iter().find(|e| e.descriptor.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.descriptor.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredCheck> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
