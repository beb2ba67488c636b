use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{Check, FileFilter};
use crate::context::RunContext;
use crate::errors::CheckError;

const TEXT_PATTERNS: [&str; 7] = ["*.go", "*.md", "*.txt", "*.yml", "*.yaml", "*.json", "Makefile"];

/// Strips trailing spaces and tabs from text files.
pub struct WhitespaceCheck {
    root: PathBuf,
    filter: FileFilter,
}

impl WhitespaceCheck {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            filter: FileFilter::patterns(&TEXT_PATTERNS),
        }
    }
}

impl Check for WhitespaceCheck {
    fn name(&self) -> &str {
        "whitespace"
    }

    fn description(&self) -> &str {
        "Fix trailing whitespace"
    }

    fn mutates_files(&self) -> bool {
        true
    }

    fn filter_files(&self, files: &[String]) -> Vec<String> {
        self.filter.filter(files)
    }

    fn run(&self, ctx: &RunContext, files: &[String]) -> Result<(), CheckError> {
        let fixed = rewrite_each(ctx, &self.root, files, strip_trailing_whitespace)?;
        issues("Fixed trailing whitespace in", fixed)
    }
}

/// Ensures text files end with exactly one newline.
pub struct EofCheck {
    root: PathBuf,
    filter: FileFilter,
}

impl EofCheck {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            filter: FileFilter::patterns(&TEXT_PATTERNS),
        }
    }
}

impl Check for EofCheck {
    fn name(&self) -> &str {
        "eof"
    }

    fn description(&self) -> &str {
        "Ensure files end with a newline"
    }

    fn mutates_files(&self) -> bool {
        true
    }

    fn filter_files(&self, files: &[String]) -> Vec<String> {
        self.filter.filter(files)
    }

    fn run(&self, ctx: &RunContext, files: &[String]) -> Result<(), CheckError> {
        let fixed = rewrite_each(ctx, &self.root, files, fix_end_of_file)?;
        issues("Fixed missing or extra final newline in", fixed)
    }
}

fn issues(prefix: &str, fixed: Vec<String>) -> Result<(), CheckError> {
    if fixed.is_empty() {
        return Ok(());
    }
    Err(CheckError::IssuesFound {
        summary: format!("{prefix} {} file(s): {}", fixed.len(), fixed.join(", ")),
        files: fixed,
    })
}

/// Apply `fix` to every readable UTF-8 file, writing back the ones it changes.
fn rewrite_each<F>(ctx: &RunContext, root: &Path, files: &[String], fix: F) -> Result<Vec<String>, CheckError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut fixed = Vec::new();
    for file in files {
        if let Some(reason) = ctx.err() {
            return Err(CheckError::Canceled(reason));
        }
        let path = root.join(file);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            // deleted in the index, or binary
            Err(err) if matches!(err.kind(), io::ErrorKind::NotFound | io::ErrorKind::InvalidData) => continue,
            Err(err) => return Err(err.into()),
        };
        if let Some(updated) = fix(&content) {
            fs::write(&path, updated)?;
            fixed.push(file.clone());
        }
    }
    Ok(fixed)
}

fn strip_trailing_whitespace(content: &str) -> Option<String> {
    let mut out = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        let (body, ending) = match line.strip_suffix("\r\n") {
            Some(body) => (body, "\r\n"),
            None => match line.strip_suffix('\n') {
                Some(body) => (body, "\n"),
                None => (line, ""),
            },
        };
        out.push_str(body.trim_end_matches([' ', '\t']));
        out.push_str(ending);
    }
    (out != content).then_some(out)
}

fn fix_end_of_file(content: &str) -> Option<String> {
    let body = content.trim_end_matches(['\n', '\r']);
    if body.is_empty() {
        return None;
    }
    let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let desired = format!("{body}{newline}");
    (desired != content).then_some(desired)
}
