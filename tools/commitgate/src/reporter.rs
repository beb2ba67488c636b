use crate::results::{CheckResult, Results};
use crate::timing::fmt_duration;
use owo_colors::Style;
use std::io::{self, Write};

/// Lines of captured tool output shown under a failed check.
const MAX_OUTPUT_LINES: usize = 20;

/// Print the pass/fail summary for a run. Returns true if nothing failed.
pub fn print_summary(results: &Results, color: bool) -> bool {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_summary(&mut out, results, color).ok();
    results.success()
}

pub fn write_summary<W: Write>(out: &mut W, results: &Results, color: bool) -> io::Result<()> {
    let paint = |text: &str, style: Style| {
        if color {
            style.style(text).to_string()
        } else {
            text.to_string()
        }
    };
    let dimmed = Style::new().dimmed();

    writeln!(out)?;
    for result in &results.check_results {
        let duration = fmt_duration(result.duration);
        if result.degraded {
            writeln!(
                out,
                "  {} {:<15} {}",
                paint("\u{26a0}", Style::new().yellow()),
                result.name,
                paint(&format!("{duration}  (tool unavailable)"), dimmed),
            )?;
        } else if result.success {
            writeln!(
                out,
                "  {} {:<15} {}",
                paint("\u{2713}", Style::new().green()),
                result.name,
                paint(&duration, dimmed),
            )?;
        } else {
            writeln!(
                out,
                "  {} {:<15} {}",
                paint("\u{2717}", Style::new().red()),
                result.name,
                paint(&format!("{duration}  {}", result.status.label()), dimmed),
            )?;
        }
        if !result.success || result.degraded {
            write_details(out, result, &paint)?;
        }
    }

    writeln!(out)?;
    let counts = format!(
        "({})  {} passed, {} failed, {} skipped",
        fmt_duration(results.total_duration),
        results.passed,
        results.failed,
        results.skipped
    );
    if results.success() {
        writeln!(out, "  {} {}", paint("PASS", Style::new().green().bold()), paint(&counts, dimmed))?;
    } else {
        writeln!(out, "  {} {}", paint("FAIL", Style::new().red().bold()), paint(&counts, dimmed))?;
    }
    writeln!(out)
}

fn write_details<W, P>(out: &mut W, result: &CheckResult, paint: &P) -> io::Result<()>
where
    W: Write,
    P: Fn(&str, Style) -> String,
{
    if let Some(error) = &result.error {
        for line in error.lines() {
            writeln!(out, "      {line}")?;
        }
    }
    if let Some(command) = &result.command {
        writeln!(out, "      {}", paint(&format!("$ {command}"), Style::new().dimmed()))?;
    }
    if let Some(output) = &result.output {
        let lines: Vec<&str> = output.lines().collect();
        for line in lines.iter().take(MAX_OUTPUT_LINES) {
            writeln!(out, "      {}", paint(line, Style::new().dimmed()))?;
        }
        if lines.len() > MAX_OUTPUT_LINES {
            writeln!(
                out,
                "      {}",
                paint(&format!("... {} more line(s)", lines.len() - MAX_OUTPUT_LINES), Style::new().dimmed())
            )?;
        }
    }
    if let Some(suggestion) = &result.suggestion {
        writeln!(out, "      {} {suggestion}", paint("\u{2192}", Style::new().cyan()))?;
    }
    Ok(())
}

/// Write `results` as pretty JSON on stdout.
pub fn print_json(results: &Results) -> io::Result<()> {
    let json = results.to_json().map_err(io::Error::other)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{json}")
}
