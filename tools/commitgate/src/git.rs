use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::context::RunContext;
use crate::runner::{CommandCall, CommandRunner, ExecError};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Exec(#[from] ExecError),
    #[error("git {args} failed: {stderr}")]
    Failed { args: String, stderr: String },
}

/// Files staged for commit, excluding deletions.
pub fn staged_files(ctx: &RunContext, runner: &dyn CommandRunner, repo_root: &Path) -> Result<Vec<String>, GitError> {
    git_lines(
        ctx,
        runner,
        repo_root,
        &["diff", "--cached", "--name-only", "--diff-filter=ACMR"],
    )
}

/// Every file tracked by the repository.
pub fn tracked_files(ctx: &RunContext, runner: &dyn CommandRunner, repo_root: &Path) -> Result<Vec<String>, GitError> {
    git_lines(ctx, runner, repo_root, &["ls-files"])
}

pub fn toplevel(ctx: &RunContext, runner: &dyn CommandRunner, dir: &Path) -> Result<PathBuf, GitError> {
    let lines = git_lines(ctx, runner, dir, &["rev-parse", "--show-toplevel"])?;
    match lines.into_iter().next() {
        Some(line) => Ok(PathBuf::from(line)),
        None => Err(GitError::Failed {
            args: "rev-parse --show-toplevel".to_string(),
            stderr: "empty output".to_string(),
        }),
    }
}

fn git_lines(ctx: &RunContext, runner: &dyn CommandRunner, dir: &Path, args: &[&str]) -> Result<Vec<String>, GitError> {
    let call = CommandCall::new("git", args.iter().map(|a| a.to_string()).collect()).in_dir(dir);
    let result = runner.run(ctx, &call)?;
    if !result.success() {
        return Err(GitError::Failed {
            args: args.join(" "),
            stderr: result.stderr.trim().to_string(),
        });
    }
    Ok(result
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
