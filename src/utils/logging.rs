//! Diagnostic logging on stderr
//!
//! `RUST_LOG` takes precedence. Without it only warnings are shown, or
//! everything from this crate at debug level when `--debug` is set.

use tracing_subscriber::EnvFilter;

fn default_directive(debug: bool) -> &'static str {
    if debug { "cctally=debug" } else { "warn" }
}

pub(crate) fn init_logging(debug: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));

    // A second init (tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .compact()
        .try_init();
}
