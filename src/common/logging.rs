//! Logging and tracing configuration
//!
//! Everything goes to stderr so stdout stays reserved for the report.

use std::io::IsTerminal;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for the CLI
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is WARN for this crate (DEBUG when `verbose`), WARN for dependencies.
/// Escape codes are only written when `color` is set and stderr is a terminal.
pub fn init_cli(verbose: bool, color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("harness=debug,warn")
        } else {
            EnvFilter::new("harness=warn,warn")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(color && std::io::stderr().is_terminal())
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}
