use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Check, FileFilter};
use crate::context::RunContext;
use crate::errors::CheckError;
use crate::runner::{CommandCall, CommandRunner};

/// How a tool's successful run is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Exit status alone decides.
    ExitStatus,
    /// The tool lists offending files on stdout (`gofmt -l` style).
    ListsFiles,
}

/// A check that shells out to one external tool.
pub struct ToolCheck {
    name: String,
    description: String,
    program: String,
    args: Vec<String>,
    append_files: bool,
    filter: FileFilter,
    mode: OutputMode,
    required_tool: Option<String>,
    suggestion: String,
    root: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl ToolCheck {
    #[allow(clippy::too_many_arguments)]
    fn new(
        name: &str,
        description: &str,
        program: &str,
        args: &[&str],
        append_files: bool,
        filter: FileFilter,
        mode: OutputMode,
        required_tool: Option<&str>,
        suggestion: &str,
        root: &Path,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            append_files,
            filter,
            mode,
            required_tool: required_tool.map(str::to_string),
            suggestion: suggestion.to_string(),
            root: root.to_path_buf(),
            runner,
        }
    }

    pub fn gofmt(root: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(
            "fmt",
            "Check Go formatting",
            "gofmt",
            &["-l"],
            true,
            FileFilter::patterns(&["*.go"]),
            OutputMode::ListsFiles,
            None,
            "Run 'gofmt -w' on the listed files",
            root,
            runner,
        )
    }

    pub fn goimports(root: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(
            "goimports",
            "Check Go imports",
            "goimports",
            &["-l"],
            true,
            FileFilter::patterns(&["*.go"]),
            OutputMode::ListsFiles,
            Some("goimports"),
            "Run 'goimports -w' on the listed files",
            root,
            runner,
        )
    }

    pub fn gofumpt(root: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(
            "fumpt",
            "Check stricter Go formatting",
            "gofumpt",
            &["-l"],
            true,
            FileFilter::patterns(&["*.go"]),
            OutputMode::ListsFiles,
            Some("gofumpt"),
            "Run 'gofumpt -w' on the listed files",
            root,
            runner,
        )
    }

    pub fn golangci_lint(root: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(
            "lint",
            "Run golangci-lint",
            "golangci-lint",
            &["run", "--new-from-rev=HEAD~1", "./..."],
            false,
            FileFilter::patterns(&["*.go"]),
            OutputMode::ExitStatus,
            Some("golangci-lint"),
            "Fix the reported lint issues",
            root,
            runner,
        )
    }

    pub fn mod_tidy(root: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(
            "mod-tidy",
            "Ensure go.mod and go.sum are tidy",
            "go",
            &["mod", "tidy", "-diff"],
            false,
            FileFilter::patterns(&["*.go", "go.mod", "go.sum"]),
            OutputMode::ExitStatus,
            None,
            "Run 'go mod tidy' and stage go.mod and go.sum",
            root,
            runner,
        )
    }

    pub fn gitleaks(root: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(
            "gitleaks",
            "Scan for secrets",
            "gitleaks",
            &["detect", "--no-git", "--source", ".", "--verbose"],
            false,
            FileFilter::Any,
            OutputMode::ExitStatus,
            Some("gitleaks"),
            "Remove secrets from code or add exceptions to .gitleaks.toml allowlist",
            root,
            runner,
        )
    }

    fn call(&self, files: &[String]) -> CommandCall {
        let mut args = self.args.clone();
        if self.append_files {
            args.extend(files.iter().cloned());
        }
        CommandCall::new(&self.program, args).in_dir(&self.root)
    }
}

impl Check for ToolCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn filter_files(&self, files: &[String]) -> Vec<String> {
        self.filter.filter(files)
    }

    fn required_tool(&self) -> Option<&str> {
        self.required_tool.as_deref()
    }

    fn run(&self, ctx: &RunContext, files: &[String]) -> Result<(), CheckError> {
        if files.is_empty() {
            return Ok(());
        }
        let call = self.call(files);
        let result = match self.runner.run(ctx, &call) {
            Ok(result) => result,
            Err(err) if err.is_not_found() => {
                return Err(CheckError::ToolNotFound {
                    tool: self.program.clone(),
                    suggestion: format!("Install {} and make sure it is on PATH", self.program),
                })
            }
            Err(err) => match err.context_error() {
                Some(reason) => return Err(CheckError::Canceled(reason)),
                None => {
                    return Err(CheckError::ToolExecution {
                        command: call.display(),
                        output: err.to_string(),
                        suggestion: self.suggestion.clone(),
                    })
                }
            },
        };

        if !result.success() {
            return Err(CheckError::ToolExecution {
                command: call.display(),
                output: result.combined(),
                suggestion: self.suggestion.clone(),
            });
        }

        if self.mode == OutputMode::ListsFiles {
            let offending: Vec<String> = result
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            if !offending.is_empty() {
                return Err(CheckError::IssuesFound {
                    summary: format!("{} reported {} file(s) needing changes", self.program, offending.len()),
                    files: offending,
                });
            }
        }
        Ok(())
    }
}
