use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::envfile;
use crate::errors::ConfigError;
use crate::tools::{default_tools, version_var, InstallSettings, RetryPolicy};

pub const BASE_ENV_FILE: &str = ".github/.env.base";
pub const CUSTOM_ENV_FILE: &str = ".github/.env.custom";
pub const GLOBAL_TIMEOUT_VAR: &str = "COMMITGATE_TIMEOUT_SECONDS";

const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
const DEFAULT_CHECK_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_INSTALL_TIMEOUT_SECONDS: u64 = 300;
const DEFAULT_PLUGIN_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_EXCLUDE_PATTERNS: &str = "vendor/,node_modules/,.git/";
const DEFAULT_PLUGIN_DIR: &str = ".commitgate/plugins";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Built-in checks: name, variable stem, enabled by default, timeout seconds.
const BUILTIN_CHECKS: [(&str, &str, bool, u64); 8] = [
    ("whitespace", "WHITESPACE", true, DEFAULT_CHECK_TIMEOUT_SECONDS),
    ("eof", "EOF", true, DEFAULT_CHECK_TIMEOUT_SECONDS),
    ("fmt", "FMT", true, DEFAULT_CHECK_TIMEOUT_SECONDS),
    ("goimports", "GOIMPORTS", true, DEFAULT_CHECK_TIMEOUT_SECONDS),
    ("fumpt", "FUMPT", true, DEFAULT_CHECK_TIMEOUT_SECONDS),
    ("lint", "LINT", true, 60),
    ("mod-tidy", "MOD_TIDY", true, DEFAULT_CHECK_TIMEOUT_SECONDS),
    ("gitleaks", "GITLEAKS", false, 60),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSettings {
    pub enabled: bool,
    /// Zero falls back to the global timeout.
    pub timeout: Duration,
    /// Variable a user would raise when this check times out.
    pub timeout_var: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInstallConfig {
    pub timeout: Duration,
    pub retry_attempts: usize,
    pub retry_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    pub timeout: Duration,
}

/// Merged, read-only settings snapshot for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub enabled: bool,
    pub log_level: String,
    pub timeout: Duration,
    pub checks: BTreeMap<String, CheckSettings>,
    pub parallel_workers: usize,
    pub fail_fast: bool,
    pub graceful_degradation: bool,
    pub tool_versions: BTreeMap<String, String>,
    pub exclude_patterns: Vec<String>,
    pub tool_install: ToolInstallConfig,
    pub plugins: PluginConfig,
    pub color_output: bool,
    pub timing_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Build from a key lookup; unknown or malformed values keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let checks = BUILTIN_CHECKS
            .iter()
            .map(|(name, stem, enabled, timeout)| {
                let timeout_var = format!("COMMITGATE_{stem}_TIMEOUT");
                let settings = CheckSettings {
                    enabled: parse_bool_var(&lookup, &format!("COMMITGATE_ENABLE_{stem}"), *enabled),
                    timeout: Duration::from_secs(parse_u64_var(&lookup, &timeout_var, *timeout)),
                    timeout_var,
                };
                (name.to_string(), settings)
            })
            .collect();

        let tool_versions = default_tools()
            .into_iter()
            .filter_map(|tool| {
                lookup(&version_var(&tool.name))
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|v| (tool.name, v))
            })
            .collect();

        let exclude_patterns = lookup("COMMITGATE_EXCLUDE_PATTERNS")
            .unwrap_or_else(|| DEFAULT_EXCLUDE_PATTERNS.to_string())
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let timing_file = lookup("COMMITGATE_TIMING_FILE")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self {
            enabled: parse_bool_var(&lookup, "ENABLE_COMMITGATE", false),
            log_level: lookup("COMMITGATE_LOG_LEVEL")
                .map(|v| v.trim().to_ascii_lowercase())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "info".to_string()),
            timeout: Duration::from_secs(parse_u64_var(&lookup, GLOBAL_TIMEOUT_VAR, DEFAULT_TIMEOUT_SECONDS)),
            checks,
            parallel_workers: parse_u64_var(&lookup, "COMMITGATE_PARALLEL_WORKERS", 0) as usize,
            fail_fast: parse_bool_var(&lookup, "COMMITGATE_FAIL_FAST", false),
            graceful_degradation: parse_bool_var(&lookup, "COMMITGATE_GRACEFUL_DEGRADATION", false),
            tool_versions,
            exclude_patterns,
            tool_install: ToolInstallConfig {
                timeout: Duration::from_secs(parse_u64_var(
                    &lookup,
                    "COMMITGATE_TOOL_INSTALL_TIMEOUT",
                    DEFAULT_INSTALL_TIMEOUT_SECONDS,
                )),
                retry_attempts: parse_u64_var(&lookup, "COMMITGATE_TOOL_INSTALL_RETRIES", 3) as usize,
                retry_delay: Duration::from_secs(parse_u64_var(&lookup, "COMMITGATE_TOOL_INSTALL_RETRY_DELAY", 2)),
            },
            plugins: PluginConfig {
                enabled: parse_bool_var(&lookup, "COMMITGATE_ENABLE_PLUGINS", false),
                directory: lookup("COMMITGATE_PLUGIN_DIR")
                    .filter(|v| !v.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_PLUGIN_DIR)),
                timeout: Duration::from_secs(parse_u64_var(
                    &lookup,
                    "COMMITGATE_PLUGIN_TIMEOUT",
                    DEFAULT_PLUGIN_TIMEOUT_SECONDS,
                )),
            },
            color_output: parse_bool_var(&lookup, "COMMITGATE_COLOR_OUTPUT", true),
            timing_file,
        }
    }

    /// Merge `.github/.env.base`, the process environment and
    /// `.github/.env.custom` (later wins), then validate.
    pub fn load(repo_root: &Path) -> Result<Self, ConfigError> {
        let vars = merged_vars(repo_root, env::vars())?;
        let config = Self::from_lookup(|key| vars.get(key).cloned());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.timeout.is_zero() {
            problems.push(format!("{GLOBAL_TIMEOUT_VAR} must be greater than 0"));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            problems.push(format!(
                "COMMITGATE_LOG_LEVEL must be one of {}, got {:?}",
                LOG_LEVELS.join(", "),
                self.log_level
            ));
        }
        if self.tool_install.timeout.is_zero() {
            problems.push("COMMITGATE_TOOL_INSTALL_TIMEOUT must be greater than 0".to_string());
        }
        if self.tool_install.retry_attempts == 0 {
            problems.push("COMMITGATE_TOOL_INSTALL_RETRIES must be at least 1".to_string());
        }
        if self.plugins.enabled && self.plugins.timeout.is_zero() {
            problems.push("COMMITGATE_PLUGIN_TIMEOUT must be greater than 0".to_string());
        }
        for (tool, version) in &self.tool_versions {
            if !is_valid_version(version) {
                problems.push(format!("{} has invalid version {version:?}", version_var(tool)));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    pub fn check(&self, name: &str) -> Option<&CheckSettings> {
        self.checks.get(name)
    }

    /// Per-check timeout, or the global one when unset.
    pub fn check_timeout(&self, name: &str) -> Duration {
        self.checks
            .get(name)
            .map(|c| c.timeout)
            .filter(|t| !t.is_zero())
            .unwrap_or(self.timeout)
    }

    pub fn install_settings(&self, quiet: bool) -> InstallSettings {
        InstallSettings {
            timeout: self.tool_install.timeout,
            retry: RetryPolicy {
                attempts: self.tool_install.retry_attempts,
                base_delay: self.tool_install.retry_delay,
            },
            quiet,
            ..InstallSettings::default()
        }
    }
}

/// Walk up from `start` to the directory that holds `.github/.env.base`.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(BASE_ENV_FILE).is_file())
        .map(Path::to_path_buf)
}

fn merged_vars<I>(repo_root: &Path, process_env: I) -> Result<HashMap<String, String>, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let base = repo_root.join(BASE_ENV_FILE);
    if !base.is_file() {
        return Err(ConfigError::EnvFileNotFound(base));
    }

    let mut vars: HashMap<String, String> = envfile::read(&base)?.into_iter().collect();
    vars.extend(process_env);

    let custom = repo_root.join(CUSTOM_ENV_FILE);
    if custom.is_file() {
        vars.extend(envfile::read(&custom)?);
    }
    Ok(vars)
}

fn is_valid_version(version: &str) -> bool {
    if version == "latest" {
        return true;
    }
    let Some(rest) = version.strip_prefix('v') else {
        return false;
    };
    let core = rest.split(['-', '+']).next().unwrap_or_default();
    !core.is_empty() && core.split('.').all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

fn parse_u64_var<F>(lookup: &F, name: &str, fallback: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(fallback)
}

fn parse_bool_var<F>(lookup: &F, name: &str, fallback: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).map(|raw| raw.trim().to_ascii_lowercase()) {
        Some(raw) if raw == "1" || raw == "true" || raw == "yes" => true,
        Some(raw) if raw == "0" || raw == "false" || raw == "no" => false,
        _ => fallback,
    }
}
