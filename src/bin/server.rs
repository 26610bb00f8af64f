//! Chat server - Entry Point
//!
//! Starts the control actor, begins listening, and drives the operator
//! console from stdin until `#quit`.

use std::env;
use std::process::ExitCode;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use chatline::control::DEFAULT_PORT;
use chatline::ServerControl;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chatline=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatline=info")),
        )
        .init();

    // Get port from command line; invalid or missing falls back to default
    let port = env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let (control, handle) = ServerControl::new(port);
    tokio::spawn(control.run());

    // Listen immediately; a bind failure is reported and the console
    // stays up so the operator can #setport and #start again
    match handle.console_line("#start").await {
        Ok(reply) => {
            for line in &reply.lines {
                println!("{line}");
            }
        }
        Err(e) => {
            eprintln!("server control unavailable: {e}");
            return ExitCode::FAILURE;
        }
    }

    // Operator console loop
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match input.next_line().await {
            Ok(Some(line)) => line,
            // EOF or console failure: shut down cleanly
            Ok(None) | Err(_) => {
                let _ = handle.console_line("#quit").await;
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match handle.console_line(&line).await {
            Ok(reply) => {
                for out in &reply.lines {
                    println!("{out}");
                }
                if reply.quit {
                    break;
                }
            }
            Err(e) => {
                eprintln!("server control unavailable: {e}");
                break;
            }
        }
    }

    ExitCode::SUCCESS
}
