mod cancel;
mod channel;
mod config;
mod consumer;
mod error;
mod events;
mod logging;
mod producer;
mod relay;
mod signals;
mod types;

use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::config::{
    Command, DEFAULT_CAPACITY, DEFAULT_INTERVAL_MS, DEFAULT_PROCESSING_MS, RelayConfig,
};
use crate::events::StdoutSink;

fn print_usage(program: &str) {
    println!("Queue Relay CLI");
    println!("Usage:");
    println!("  {program} [run] [options]   (run until interrupted)");
    println!("  {program} --help");
    println!();
    println!("Options:");
    println!("  --capacity N         channel capacity (default {DEFAULT_CAPACITY})");
    println!("  --producers A,B,..   producer identifiers (default 1,2)");
    println!("  --interval-ms N      pause between sends (default {DEFAULT_INTERVAL_MS})");
    println!("  --processing-ms N    simulated work per message (default {DEFAULT_PROCESSING_MS})");
    println!("  --idle-backoff-ms N  pause after an empty poll (default 0, busy-poll)");
    println!("  --messages N         stop each producer after N messages and exit when drained");
    println!("  --quiet-idle         do not print idle polls");
    println!();
    println!("SIGINT/SIGTERM stops the relay cleanly (exit 0); a second signal exits at once.");
}

fn exit_with_usage(program: &str, message: &str) -> ! {
    eprintln!("{message}");
    print_usage(program);
    std::process::exit(2);
}

fn start(config: &RelayConfig) -> i32 {
    println!("Started queue relay\nPID: {}", std::process::id());

    let token = CancellationToken::new();
    // Mask first: every thread spawned after this inherits the blocked set.
    let signals_ready = signals::block_shutdown_signals()
        .and_then(|()| signals::spawn_signal_waiter(token.clone()));
    if let Err(err) = signals_ready {
        eprintln!("failed to install signal handling: {err}");
        return 1;
    }

    let sink = Arc::new(StdoutSink::new(config.quiet_idle, token.clone()));
    let summary = match relay::run(config, token, sink) {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("relay error: {err}");
            return 1;
        }
    };
    if let Err(err) = summary.write_to(&mut std::io::stdout().lock()) {
        crate::log_dev!("[MAIN] summary not written: {err}");
    }
    if summary.is_clean() { 0 } else { 1 }
}

fn main() {
    logging::init();
    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "queue_relay".to_string());
    match config::parse_args(std::env::args().skip(1)) {
        Ok(Command::Help) => print_usage(&program),
        Ok(Command::Run(config)) => std::process::exit(start(&config)),
        Err(err) => exit_with_usage(&program, &err.to_string()),
    }
}
