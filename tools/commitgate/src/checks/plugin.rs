use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{Check, FileFilter};
use crate::context::RunContext;
use crate::errors::{CheckError, PluginError};
use crate::runner::{CommandCall, CommandRunner};

pub const MANIFEST_FILE: &str = "plugin.json";

static DURATION_PART: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)(ms|s|m|h)").unwrap());
static ENV_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub file_patterns: Vec<String>,
    /// Go-style duration such as `30s` or `1m30s`.
    #[serde(default)]
    pub timeout: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Sent to the plugin on stdin.
#[derive(Debug, Serialize)]
pub struct PluginRequest<'a> {
    pub command: &'a str,
    pub files: &'a [String],
    #[serde(skip_serializing_if = "no_config")]
    pub config: &'a BTreeMap<String, String>,
}

fn no_config(config: &&BTreeMap<String, String>) -> bool {
    config.is_empty()
}

/// Expected on the plugin's stdout.
#[derive(Debug, Default, Deserialize)]
pub struct PluginResponse {
    pub success: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub output: String,
}

/// Parse `500ms`, `30s`, `2m`, `1h`, or combinations like `1m30s`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let mut total = Duration::ZERO;
    let mut consumed = 0;
    for caps in DURATION_PART.captures_iter(raw) {
        let whole = caps.get(0)?;
        if whole.start() != consumed {
            return None;
        }
        consumed = whole.end();
        let value: u64 = caps[1].parse().ok()?;
        let part = match &caps[2] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60)?),
            _ => Duration::from_secs(value.checked_mul(3600)?),
        };
        total = total.checked_add(part)?;
    }
    (consumed == raw.len() && consumed > 0).then_some(total)
}

/// Replace `$VAR` and `${VAR}` with values from `lookup`; unset variables become empty.
pub fn expand_env<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_REFERENCE
        .replace_all(value, |caps: &regex::Captures<'_>| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            lookup(name).unwrap_or_default()
        })
        .into_owned()
}

/// A check backed by an external executable speaking JSON over stdio.
pub struct PluginCheck {
    manifest: PluginManifest,
    directory: PathBuf,
    timeout: Option<Duration>,
    filter: FileFilter,
    runner: Arc<dyn CommandRunner>,
}

impl PluginCheck {
    pub fn new(manifest: PluginManifest, directory: &Path, runner: Arc<dyn CommandRunner>) -> Result<Self, PluginError> {
        if manifest.name.trim().is_empty() {
            return Err(PluginError::NameEmpty);
        }
        if manifest.executable.trim().is_empty() {
            return Err(PluginError::ExecutableEmpty);
        }
        let timeout = if manifest.timeout.trim().is_empty() {
            None
        } else {
            Some(parse_duration(&manifest.timeout).ok_or_else(|| PluginError::InvalidTimeout(manifest.timeout.clone()))?)
        };
        let filter = if manifest.file_patterns.is_empty() {
            FileFilter::Any
        } else {
            FileFilter::Patterns(manifest.file_patterns.clone())
        };
        Ok(Self {
            manifest,
            directory: directory.to_path_buf(),
            timeout,
            filter,
            runner,
        })
    }

    pub fn load(directory: &Path, runner: Arc<dyn CommandRunner>) -> Result<Self, PluginError> {
        let path = directory.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|source| PluginError::Read {
            path: path.clone(),
            source,
        })?;
        let manifest: PluginManifest =
            serde_json::from_str(&content).map_err(|source| PluginError::Parse { path, source })?;
        Self::new(manifest, directory, runner)
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    /// Timeout declared by the manifest, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn executable(&self) -> PathBuf {
        let executable = Path::new(&self.manifest.executable);
        if executable.is_absolute() {
            executable.to_path_buf()
        } else {
            self.directory.join(executable)
        }
    }

    fn failure(&self, output: String, suggestion: String) -> CheckError {
        CheckError::ToolExecution {
            command: self.manifest.name.clone(),
            output,
            suggestion,
        }
    }
}

impl Check for PluginCheck {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    fn filter_files(&self, files: &[String]) -> Vec<String> {
        self.filter.filter(files)
    }

    /// Plugins may report files they modified.
    fn mutates_files(&self) -> bool {
        true
    }

    fn run(&self, ctx: &RunContext, files: &[String]) -> Result<(), CheckError> {
        let executable = self.executable();
        if !executable.exists() {
            return Err(CheckError::ToolNotFound {
                tool: self.manifest.name.clone(),
                suggestion: format!("Plugin executable not found: {}", executable.display()),
            });
        }

        let request = PluginRequest {
            command: "check",
            files,
            config: &self.manifest.environment,
        };
        let payload = serde_json::to_string(&request).map_err(std::io::Error::other)?;

        let mut call = CommandCall::new(executable.to_string_lossy(), self.manifest.args.clone())
            .in_dir(&self.directory)
            .with_stdin(payload);
        for (key, value) in &self.manifest.environment {
            call = call.with_env(key, expand_env(value, |name| std::env::var(name).ok()));
        }

        let result = match self.runner.run(ctx, &call) {
            Ok(result) => result,
            Err(err) => {
                if let Some(reason) = err.context_error() {
                    return Err(CheckError::Canceled(reason));
                }
                if err.is_not_found() {
                    return Err(CheckError::ToolNotFound {
                        tool: self.manifest.name.clone(),
                        suggestion: err.to_string(),
                    });
                }
                return Err(self.failure(err.to_string(), "Check the plugin executable".to_string()));
            }
        };

        let stdout = result.stdout.trim();
        let response = serde_json::from_str::<PluginResponse>(stdout).ok();

        if !result.success() {
            return Err(match response {
                Some(response) if !response.error.is_empty() => self.failure(response.error, response.suggestion),
                _ => self.failure(
                    result.stderr.clone(),
                    format!("Plugin failed with exit code: {}", result.status),
                ),
            });
        }

        match response {
            None if stdout.is_empty() => Ok(()),
            None => Err(self.failure(
                result.stdout.clone(),
                "Plugin output was not in expected JSON format".to_string(),
            )),
            Some(response) if response.success => {
                if !response.modified.is_empty() {
                    tracing::info!(plugin = %self.manifest.name, modified = ?response.modified, "plugin modified files");
                }
                Ok(())
            }
            Some(response) => {
                let output = if response.output.is_empty() {
                    response.error
                } else {
                    format!("{}\n{}", response.error, response.output)
                };
                Err(self.failure(output, response.suggestion))
            }
        }
    }
}

/// Load every `<dir>/<plugin>/plugin.json`. A missing directory means no plugins.
pub fn load_plugins(directory: &Path, runner: Arc<dyn CommandRunner>) -> (Vec<PluginCheck>, Vec<PluginError>) {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return (Vec::new(), Vec::new()),
        Err(source) => {
            return (
                Vec::new(),
                vec![PluginError::Read {
                    path: directory.to_path_buf(),
                    source,
                }],
            )
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut plugins = Vec::new();
    let mut errors = Vec::new();
    for dir in dirs {
        if !dir.join(MANIFEST_FILE).is_file() {
            continue;
        }
        match PluginCheck::load(&dir, Arc::clone(&runner)) {
            Ok(plugin) => plugins.push(plugin),
            Err(err) => errors.push(err),
        }
    }
    (plugins, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RealCommandRunner;

    fn write_plugin(root: &Path, name: &str, manifest: &str, script: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
        let script_path = dir.join("check.sh");
        fs::write(&script_path, script).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    }

    fn run_script(script: &str) -> Result<(), CheckError> {
        let root = tempfile::tempdir().unwrap();
        let dir = write_plugin(
            root.path(),
            "p",
            r#"{"name":"p","executable":"./check.sh"}"#,
            script,
        );
        let plugin = PluginCheck::load(&dir, Arc::new(RealCommandRunner)).unwrap();
        plugin.run(&RunContext::background(), &["a.go".to_string()])
    }

    #[test]
    fn parse_duration_accepts_go_style_values() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("30"), None);
        assert_eq!(parse_duration("30s later"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn parse_duration_rejects_overflowing_values() {
        assert_eq!(parse_duration("99999999999999999h"), None);
        assert_eq!(parse_duration("9999999999999999999m"), None);
        assert_eq!(parse_duration("99999999999999999999s"), None);
        assert_eq!(parse_duration("18446744073709551615s1s"), None);

        let manifest = PluginManifest {
            name: "p".to_string(),
            executable: "x".to_string(),
            timeout: "99999999999999999h".to_string(),
            ..PluginManifest::default()
        };
        assert!(matches!(
            PluginCheck::new(manifest, Path::new("."), Arc::new(RealCommandRunner)),
            Err(PluginError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn environment_values_expand_variables() {
        let lookup = |name: &str| match name {
            "HOME" => Some("/home/dev".to_string()),
            "LEVEL" => Some("3".to_string()),
            _ => None,
        };
        assert_eq!(expand_env("$HOME/.cache", lookup), "/home/dev/.cache");
        assert_eq!(expand_env("${LEVEL}x", lookup), "3x");
        assert_eq!(expand_env("a$UNSET-b", lookup), "a-b");
        assert_eq!(expand_env("plain", lookup), "plain");
        assert_eq!(expand_env("cost $5", lookup), "cost $5");
    }

    #[test]
    fn plugin_sees_expanded_environment() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_plugin(
            root.path(),
            "p",
            r#"{"name":"p","executable":"./check.sh","environment":{"TARGET":"${PATH}|$COMMITGATE_UNSET_FOR_TEST|"}}"#,
            "#!/bin/sh\ncat >/dev/null\necho \"$TARGET\" >&2\nexit 1\n",
        );
        let plugin = PluginCheck::load(&dir, Arc::new(RealCommandRunner)).unwrap();
        let err = plugin.run(&RunContext::background(), &["a.go".to_string()]).unwrap_err();
        let output = err.output().unwrap();
        let path = std::env::var("PATH").unwrap();
        assert!(output.contains(&format!("{path}||")), "{output}");
        assert!(!output.contains("${PATH}"), "{output}");
    }

    #[test]
    fn manifest_validation() {
        let runner: Arc<dyn CommandRunner> = Arc::new(RealCommandRunner);
        let missing_name = PluginManifest {
            executable: "x".to_string(),
            ..PluginManifest::default()
        };
        assert!(matches!(
            PluginCheck::new(missing_name, Path::new("."), Arc::clone(&runner)),
            Err(PluginError::NameEmpty)
        ));

        let bad_timeout = PluginManifest {
            name: "p".to_string(),
            executable: "x".to_string(),
            timeout: "forever".to_string(),
            ..PluginManifest::default()
        };
        assert!(matches!(
            PluginCheck::new(bad_timeout, Path::new("."), runner),
            Err(PluginError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn empty_output_and_zero_exit_is_success() {
        run_script("#!/bin/sh\ncat >/dev/null\nexit 0\n").unwrap();
    }

    #[test]
    fn json_failure_response_is_reported() {
        let err = run_script(
            "#!/bin/sh\ncat >/dev/null\necho '{\"success\":false,\"error\":\"TODO found\",\"suggestion\":\"remove it\"}'\n",
        )
        .unwrap_err();
        assert_eq!(err.suggestion().as_deref(), Some("remove it"));
        assert!(err.output().unwrap().contains("TODO found"));
    }

    #[test]
    fn non_json_output_is_a_failure() {
        let err = run_script("#!/bin/sh\ncat >/dev/null\necho 'all good?'\n").unwrap_err();
        assert_eq!(
            err.suggestion().as_deref(),
            Some("Plugin output was not in expected JSON format")
        );
    }

    #[test]
    fn request_reaches_plugin_stdin() {
        let err = run_script("#!/bin/sh\nread line\necho \"$line\" >&2\nexit 3\n").unwrap_err();
        let output = err.output().unwrap();
        assert!(output.contains("\"command\":\"check\""), "{output}");
        assert!(output.contains("\"files\":[\"a.go\"]"), "{output}");
        assert_eq!(err.suggestion().as_deref(), Some("Plugin failed with exit code: 3"));
    }

    #[test]
    fn missing_executable_is_skippable() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("p");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), r#"{"name":"p","executable":"./nope.sh"}"#).unwrap();
        let plugin = PluginCheck::load(&dir, Arc::new(RealCommandRunner)).unwrap();
        let err = plugin.run(&RunContext::background(), &[]).unwrap_err();
        assert!(err.can_skip());
    }

    #[test]
    fn load_plugins_collects_good_and_bad_manifests() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(root.path(), "a-good", r#"{"name":"good","executable":"./check.sh"}"#, "#!/bin/sh\n");
        write_plugin(root.path(), "b-bad", "{not json", "#!/bin/sh\n");
        fs::create_dir_all(root.path().join("c-no-manifest")).unwrap();

        let (plugins, errors) = load_plugins(root.path(), Arc::new(RealCommandRunner));
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name(), "good");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], PluginError::Parse { .. }));
    }

    #[test]
    fn missing_plugin_directory_is_empty() {
        let (plugins, errors) = load_plugins(Path::new("/definitely/not/here"), Arc::new(RealCommandRunner));
        assert!(plugins.is_empty());
        assert!(errors.is_empty());
    }
}
