mod cli;
mod initializers;

use std::time::Instant;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::cli::{CLI, emit_error_report};
use crate::initializers::{init_tracing, spawn_interrupt_handler};

#[tokio::main]
async fn main() {
    let started_at = Instant::now();
    let CLI {
        log_level,
        log_color,
        command,
    } = CLI::parse();
    init_tracing(log_level, &log_color);

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    if let Err(error) = command.run(cancel).await {
        emit_error_report(
            command.json_output(),
            started_at,
            &error,
            command.report_file(),
        );
        std::process::exit(1);
    }
}
