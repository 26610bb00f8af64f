//! Chat client - Entry Point
//!
//! Connects to the server with the given login id and relays console
//! input until `#quit` or an unrecoverable send failure.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use chatline::client::{DEFAULT_HOST, DEFAULT_PORT};
use chatline::{ChatClient, ChatDisplay, ClientOutcome};

/// Prints server traffic and client notices to the terminal
struct ConsoleDisplay;

impl ChatDisplay for ConsoleDisplay {
    fn display(&self, message: &str) {
        println!("> {message}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging with environment filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatline=info")),
        )
        .init();

    // Positional arguments: <loginid> [host] [port]
    let mut args = env::args().skip(1);
    let Some(id) = args.next() else {
        eprintln!("ERROR - No login ID specified. Connection aborted.");
        return ExitCode::FAILURE;
    };
    let host = args.next().unwrap_or_else(|| DEFAULT_HOST.to_string());
    // Invalid or missing port falls back to the default
    let port = args
        .next()
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let mut client = ChatClient::new(id, host, port, Arc::new(ConsoleDisplay));
    if let Err(e) = client.connect().await {
        eprintln!("Error: Can't setup connection! Terminating client. ({e})");
        return ExitCode::FAILURE;
    }

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match input.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => {
                // EOF: same clean path as #quit
                let _ = client.handle_input("#quit").await;
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        if client.handle_input(&line).await == ClientOutcome::Quit {
            break;
        }
    }

    ExitCode::SUCCESS
}
