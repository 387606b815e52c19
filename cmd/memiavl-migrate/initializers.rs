use std::io::IsTerminal;

use tokio_util::sync::CancellationToken;
use tracing::{Level, warn};
use tracing_subscriber::{EnvFilter, filter::Directive, fmt};

use crate::cli::LogColor;

/// Installs the global subscriber. Logs go to stderr so that `--json`
/// output on stdout stays machine readable.
pub fn init_tracing(log_level: Level, log_color: &LogColor) {
    let log_filter = EnvFilter::builder()
        .with_default_directive(Directive::from(log_level))
        .from_env_lossy();

    let use_color = match log_color {
        LogColor::Always => true,
        LogColor::Never => false,
        LogColor::Auto => std::io::stderr().is_terminal(),
    };
    let include_target = matches!(log_level, Level::DEBUG | Level::TRACE);

    fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .with_target(include_target)
        .with_ansi(use_color)
        .init();
}

/// First Ctrl-C cancels the migration at the next store boundary; a second
/// one exits immediately.
pub fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, stopping after the current store (press Ctrl-C again to abort)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt received, aborting");
            std::process::exit(2);
        }
    });
}
