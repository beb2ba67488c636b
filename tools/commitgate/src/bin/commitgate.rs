use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use commitgate::checks::Registry;
use commitgate::config::{self, Config};
use commitgate::runner::{CommandRunner, RealCommandRunner};
use commitgate::timing::{append_timing, fmt_duration, utc_now_iso8601, RunTiming, Stopwatch};
use commitgate::{git, reporter, telemetry};
use commitgate::{CheckEvent, CheckStatus, ContextError, Provisioner, RunContext, RunError, RunOptions, Runner};
use owo_colors::OwoColorize;

const EXIT_OK: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_ERROR: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "commitgate", version)]
#[command(about = "Run pre-commit checks in parallel with timeouts and on-demand tool installs")]
struct Cli {
    /// Repository root; defaults to the enclosing git repository.
    #[arg(long, global = true)]
    repo_root: Option<PathBuf>,
    /// Silence install notices and progress lines.
    #[arg(long, short, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run checks against staged (or selected) files.
    Run(RunArgs),
    /// Install every external tool the checks need.
    InstallTools,
    /// List registered checks.
    List,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Check every tracked file instead of the staged ones.
    #[arg(long)]
    all_files: bool,
    #[arg(long, value_delimiter = ',')]
    files: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    skip: Vec<String>,
    /// Worker count; 0 uses every CPU.
    #[arg(long)]
    parallel: Option<usize>,
    #[arg(long)]
    fail_fast: bool,
    /// Treat missing tools as warnings.
    #[arg(long)]
    graceful: bool,
    #[arg(long)]
    json: bool,
    #[arg(long)]
    verbose: bool,
    #[arg(long)]
    no_color: bool,
}

fn main() {
    let cli = Cli::parse();

    let ctx = RunContext::background();
    let interrupt = ctx.clone();
    if let Err(error) = ctrlc::set_handler(move || interrupt.cancel()) {
        eprintln!("\u{26a0}\u{fe0f}  Unable to register signal handler: {error}");
    }

    let root = resolve_root(&ctx, cli.repo_root.as_deref());
    let config = match Config::load(&root) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {err}", "\u{2717}".red());
            process::exit(EXIT_ERROR);
        }
    };
    telemetry::init_tracing(&config.log_level);

    let code = match cli.command {
        Command::Run(args) => run(&ctx, &root, config, &args, cli.quiet),
        Command::InstallTools => install_tools(&ctx, &config, cli.quiet),
        Command::List => list(&root, &config),
    };
    process::exit(code);
}

fn resolve_root(ctx: &RunContext, explicit: Option<&Path>) -> PathBuf {
    let start = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => git::toplevel(ctx, &RealCommandRunner, Path::new("."))
            .or_else(|_| std::env::current_dir())
            .unwrap_or_else(|_| PathBuf::from(".")),
    };
    config::find_repo_root(&start).unwrap_or(start)
}

fn run(ctx: &RunContext, root: &Path, config: Config, args: &RunArgs, quiet: bool) -> i32 {
    if !config.enabled {
        if !quiet {
            println!("commitgate is disabled (set ENABLE_COMMITGATE=true to enable)");
        }
        return EXIT_OK;
    }

    let runner: Arc<dyn CommandRunner> = Arc::new(RealCommandRunner);
    let files = match collect_files(ctx, runner.as_ref(), root, args) {
        Ok(files) => files,
        Err(err) => {
            eprintln!("{} {err}", "\u{2717}".red());
            return EXIT_ERROR;
        }
    };
    if files.is_empty() {
        if !quiet {
            println!("No files to check");
        }
        return EXIT_OK;
    }

    let provisioner = Provisioner::with_defaults(config.install_settings(quiet || args.json));
    provisioner.apply_versions(&config.tool_versions);
    let registry = Registry::from_config(&config, root, Arc::clone(&runner));

    let mut options = RunOptions::from_config(&config);
    options.files = files;
    options.only_checks = args.only.clone();
    options.skip_checks = args.skip.clone();
    if let Some(parallel) = args.parallel {
        options.parallel = parallel;
    }
    options.fail_fast |= args.fail_fast;
    options.graceful_degradation |= args.graceful;
    if args.verbose && !args.json {
        options.on_progress = Some(Arc::new(print_event));
    }

    let color = config.color_output && !args.no_color && io::stdout().is_terminal();
    let timing_file = config.timing_file.clone();
    let file_count = options.files.len();
    let scheduler = Runner::new(config, registry, Arc::new(provisioner));

    let stopwatch = Stopwatch::start();
    let outcome = scheduler.run(ctx, &options);
    let code = match &outcome {
        Ok(results) => {
            if args.json {
                if let Err(err) = reporter::print_json(results) {
                    eprintln!("failed to write results: {err}");
                }
            } else {
                reporter::print_summary(results, color);
            }
            if ctx.err() == Some(ContextError::Canceled) {
                EXIT_INTERRUPTED
            } else if results.success() {
                EXIT_OK
            } else {
                EXIT_FAILED
            }
        }
        Err(RunError::Canceled(_)) => EXIT_INTERRUPTED,
        Err(err) => {
            eprintln!("{} {err}", "\u{2717}".red());
            EXIT_ERROR
        }
    };

    if let Some(path) = timing_file {
        let (checks, passed, failed, skipped) = match &outcome {
            Ok(r) => (r.check_results.len(), r.passed, r.failed, r.skipped),
            Err(_) => (0, 0, 0, 0),
        };
        let timing = RunTiming {
            timestamp: utc_now_iso8601(),
            files: file_count,
            checks,
            passed,
            failed,
            skipped,
            exit_code: code,
            duration_ms: stopwatch.elapsed().as_millis() as u64,
        };
        if let Err(err) = append_timing(&path, &timing) {
            tracing::warn!(path = %path.display(), error = %err, "failed to record run timing");
        }
    }
    code
}

fn collect_files(ctx: &RunContext, runner: &dyn CommandRunner, root: &Path, args: &RunArgs) -> Result<Vec<String>, git::GitError> {
    if !args.files.is_empty() {
        return Ok(args.files.clone());
    }
    if args.all_files {
        git::tracked_files(ctx, runner, root)
    } else {
        git::staged_files(ctx, runner, root)
    }
}

fn print_event(name: &str, event: CheckEvent, duration: Duration) {
    match event {
        CheckEvent::Running => eprintln!("  {} {name}", "\u{2026}".dimmed()),
        CheckEvent::Finished(CheckStatus::Passed) => {
            eprintln!("  {} {name} {}", "\u{2713}".green(), fmt_duration(duration).dimmed())
        }
        CheckEvent::Finished(status) => {
            eprintln!("  {} {name} {}", "\u{2717}".red(), status.label().dimmed())
        }
    }
}

fn install_tools(ctx: &RunContext, config: &Config, quiet: bool) -> i32 {
    let provisioner = Provisioner::with_defaults(config.install_settings(quiet));
    provisioner.apply_versions(&config.tool_versions);
    match provisioner.install_all_tools(ctx) {
        Ok(()) => {
            if !quiet {
                println!("{} All tools installed", "\u{2713}".green());
            }
            EXIT_OK
        }
        Err(_) if ctx.is_done() => EXIT_INTERRUPTED,
        Err(err) => {
            eprintln!("{} {err}", "\u{2717}".red());
            EXIT_FAILED
        }
    }
}

fn list(root: &Path, config: &Config) -> i32 {
    let registry = Registry::from_config(config, root, Arc::new(RealCommandRunner));
    println!();
    for entry in registry.iter() {
        let descriptor = &entry.descriptor;
        let mark = if descriptor.enabled {
            "\u{2713}".green().to_string()
        } else {
            "\u{2717}".red().to_string()
        };
        let timeout = if descriptor.timeout.is_zero() {
            config.timeout
        } else {
            descriptor.timeout
        };
        let mut detail = format!("{}  timeout {}", entry.check.description(), fmt_duration(timeout));
        if let Some(tool) = entry.check.required_tool() {
            detail.push_str(&format!("  requires {tool}"));
        }
        println!("  {} {:<15} {}", mark, descriptor.name, detail.dimmed());
    }
    println!();
    EXIT_OK
}
