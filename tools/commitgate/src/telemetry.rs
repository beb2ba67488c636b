use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install a stderr tracing subscriber once per process.
///
/// `RUST_LOG` wins over `default_level` when it is set. Later calls are no-ops.
pub fn init_tracing(default_level: &str) {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("commitgate={default_level}")))
        .unwrap_or_else(|_| EnvFilter::new("commitgate=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    let _ = TRACING_INIT.set(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing("debug");
        init_tracing("not a level");
        assert!(TRACING_INIT.get().is_some());
    }
}
