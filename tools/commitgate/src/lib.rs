pub mod checks;
pub mod config;
pub mod context;
pub mod envfile;
pub mod errors;
pub mod git;
pub mod progress;
pub mod reporter;
pub mod results;
pub mod runner;
pub mod scheduler;
pub mod telemetry;
pub mod timing;
pub mod tools;

pub use config::Config;
pub use context::{ContextError, RunContext};
pub use errors::{CheckError, ConfigError, RunError, TimeoutError, ToolError};
pub use results::{CheckResult, CheckStatus, Results};
pub use runner::{CommandCall, CommandResult, CommandRunner, RealCommandRunner};
pub use scheduler::{CheckEvent, RunOptions, Runner};
pub use tools::Provisioner;
