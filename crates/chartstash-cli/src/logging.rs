//! Logging setup.

use tracing_subscriber::EnvFilter;

/// Filter used with `--debug` when `RUST_LOG` is unset.
const DEBUG_FILTER: &str = "chartstash=debug,chartstash_cli=debug,chartstash_core=debug";

/// Install the global subscriber. Logs go to stderr so `pull` output on
/// stdout stays clean; `RUST_LOG` takes precedence over `debug`.
pub fn init(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { DEBUG_FILTER } else { "warn" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .init();
}
