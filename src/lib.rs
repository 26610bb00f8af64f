//! Multi-client line-oriented chat service
//!
//! A chat server and client speaking a newline-delimited text protocol
//! over TCP, with in-band `#`-prefixed commands for session identity and
//! server lifecycle control.
//!
//! # Features
//! - Concurrent client connections, one task per connection
//! - Per-connection identity established via `#login`
//! - Broadcast relay of chat lines to every connected client
//! - Operator console commands: start/stop/close the listener, change the
//!   port, broadcast operator messages
//! - Client console commands: login/logoff, host/port reconfiguration
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ServerControl` is the central actor owning the connection registry
//!   and the listener lifecycle
//! - Each connection has a session task communicating with the actor
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use chatline::ServerControl;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (control, handle) = ServerControl::new(5555);
//!     tokio::spawn(control.run());
//!
//!     handle.console_line("#start").await.unwrap();
//!     let reply = handle.console_line("#getport").await.unwrap();
//!     println!("listening on {}", reply.lines[0]);
//! }
//! ```

pub mod client;
pub mod command;
pub mod control;
pub mod error;
pub mod registry;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::{ChatClient, ChatDisplay, ClientOutcome};
pub use command::{ClientCommand, Inbound, ServerCommand};
pub use control::{ConsoleReply, ControlCommand, ControlHandle, ServerControl};
pub use error::{AppError, SendError};
pub use registry::{ConnectionRegistry, Peer};
pub use session::handle_connection;
pub use types::{ConnectionId, Identity};
