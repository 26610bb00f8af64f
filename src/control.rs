//! ServerControl actor
//!
//! The central actor owning the connection registry and the listener
//! lifecycle. Sessions, the accept loop, and the operator console all talk
//! to it over one `mpsc` command channel, so registry mutation, broadcast
//! fan-out, and lifecycle transitions are serialized without locks.

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::command::{self, ServerCommand};
use crate::error::AppError;
use crate::registry::{ConnectionRegistry, Peer};
use crate::session;
use crate::types::{ConnectionId, Identity};

/// The default port to listen on
pub const DEFAULT_PORT: u16 = 5555;

/// Channel buffer size for control commands
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Commands sent to the ServerControl actor
#[derive(Debug)]
pub enum ControlCommand {
    /// New connection accepted; carries its outbound queue
    Connect {
        id: ConnectionId,
        outbound: mpsc::UnboundedSender<String>,
    },
    /// Connection torn down
    Disconnect { id: ConnectionId },
    /// Inbound `#login` with its raw argument
    Login { id: ConnectionId, argument: String },
    /// Inbound chat line, relayed verbatim
    Chat { id: ConnectionId, line: String },
    /// One operator console line; the reply carries the report output
    Operator {
        line: String,
        reply: oneshot::Sender<ConsoleReply>,
    },
    /// Number of registered connections
    ConnectionCount { reply: oneshot::Sender<usize> },
}

/// What the operator console gets back for one input line
#[derive(Debug, Default)]
pub struct ConsoleReply {
    /// Report lines to show the operator
    pub lines: Vec<String>,
    /// The operator asked to terminate the process
    pub quit: bool,
}

/// Clonable handle for driving the control actor
///
/// Held by the operator console and by tests.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlCommand>,
}

impl ControlHandle {
    /// Submit one operator console line and wait for its report.
    pub async fn console_line(&self, line: &str) -> Result<ConsoleReply, AppError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControlCommand::Operator {
                line: line.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| AppError::ChannelSend)?;
        reply_rx.await.map_err(|_| AppError::ChannelSend)
    }

    /// Number of currently registered connections.
    pub async fn connection_count(&self) -> Result<usize, AppError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControlCommand::ConnectionCount { reply: reply_tx })
            .await
            .map_err(|_| AppError::ChannelSend)?;
        reply_rx.await.map_err(|_| AppError::ChannelSend)
    }
}

/// A running accept loop and the means to stop it
struct AcceptLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The central server actor
///
/// Owns the registry, the configured port, and the accept loop. Listening
/// state is derived from whether an accept loop is currently held.
pub struct ServerControl {
    registry: ConnectionRegistry,
    port: u16,
    accept: Option<AcceptLoop>,
    receiver: mpsc::Receiver<ControlCommand>,
    /// Handed to each accepted connection's session task
    cmd_tx: mpsc::Sender<ControlCommand>,
}

impl ServerControl {
    /// Create a stopped server on the given port plus its console handle.
    pub fn new(port: u16) -> (Self, ControlHandle) {
        let (cmd_tx, receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let control = Self {
            registry: ConnectionRegistry::new(),
            port,
            accept: None,
            receiver,
            cmd_tx: cmd_tx.clone(),
        };
        (control, ControlHandle { tx: cmd_tx })
    }

    /// Run the control event loop.
    ///
    /// Processes commands until the operator quits; `#quit` tears down the
    /// listener and every connection before the loop returns.
    pub async fn run(mut self) {
        info!("server control started (port {})", self.port);

        while let Some(cmd) = self.receiver.recv().await {
            if self.handle_command(cmd).await {
                break;
            }
        }

        info!("server control stopped");
    }

    /// Process a single command; returns true when the actor should exit
    async fn handle_command(&mut self, cmd: ControlCommand) -> bool {
        match cmd {
            ControlCommand::Connect { id, outbound } => {
                self.handle_connect(id, outbound);
            }
            ControlCommand::Disconnect { id } => {
                self.handle_disconnect(id);
            }
            ControlCommand::Login { id, argument } => {
                self.handle_login(id, &argument);
            }
            ControlCommand::Chat { id, line } => {
                self.handle_chat(id, &line);
            }
            ControlCommand::Operator { line, reply } => {
                let outcome = self.handle_operator(&line).await;
                let quit = outcome.quit;
                let _ = reply.send(outcome);
                return quit;
            }
            ControlCommand::ConnectionCount { reply } => {
                let _ = reply.send(self.registry.len());
            }
        }
        false
    }

    /// Handle a newly accepted connection
    fn handle_connect(&mut self, id: ConnectionId, outbound: mpsc::UnboundedSender<String>) {
        info!("A client has connected to the server (connection {id})");
        if let Err(e) = self.registry.add(id, Peer::new(outbound)) {
            error!("{e}");
            return;
        }
        debug!("Total clients: {}", self.registry.len());
    }

    /// Handle a connection teardown
    fn handle_disconnect(&mut self, id: ConnectionId) {
        // The peer may already be gone if a broadcast push failed first
        if self.registry.remove(id).is_some() {
            info!("A client has disconnected from the server (connection {id})");
            debug!("Total clients: {}", self.registry.len());
        }
    }

    /// Handle an inbound `#login`
    ///
    /// Assigns the sanitized identity to the connection. Nothing is
    /// broadcast.
    fn handle_login(&mut self, id: ConnectionId, argument: &str) {
        info!("Message received: #login {argument} from connection {id}");
        let Some(identity) = Identity::sanitize(argument) else {
            warn!("connection {id} sent an empty login id; ignoring");
            return;
        };
        if self.registry.set_identity(id, identity.clone()) {
            info!("<{identity}> has logged on");
        } else {
            warn!("login from unregistered connection {id}; ignoring");
        }
    }

    /// Handle an inbound chat line
    ///
    /// Relays `<identity> sent a message: <line>` to every connection,
    /// including the sender. Lines from connections no longer registered
    /// (torn down by `#close`) are dropped.
    fn handle_chat(&mut self, id: ConnectionId, line: &str) {
        if !self.registry.contains(id) {
            debug!("dropping line from unregistered connection {id}");
            return;
        }
        let message = format!("<{}> sent a message: {line}", self.registry.display_name(id));
        info!("{message}");
        self.broadcast(&message);
    }

    /// Execute one operator console line
    async fn handle_operator(&mut self, line: &str) -> ConsoleReply {
        let mut reply = ConsoleReply::default();
        match ServerCommand::parse(line) {
            ServerCommand::Message(text) => {
                if text.trim().is_empty() {
                    return reply;
                }
                let message = format!("SERVER MSG> {text}");
                self.broadcast(&message);
                reply.lines.push(message);
            }
            ServerCommand::Quit => {
                self.stop_listening().await;
                self.registry.clear();
                reply.quit = true;
            }
            ServerCommand::Stop => {
                // No-op if already stopped
                if self.accept.is_some() {
                    self.stop_listening().await;
                    let notice = "The server has stopped listening for new clients";
                    self.broadcast(notice);
                    reply.lines.push(notice.to_string());
                }
            }
            ServerCommand::Close => {
                // Broadcast first so clients see the notice before their
                // queues are dropped
                let notice = "The server has closed";
                self.broadcast(notice);
                self.stop_listening().await;
                self.registry.clear();
                reply.lines.push(notice.to_string());
            }
            ServerCommand::SetPort(argument) => {
                if self.accept.is_some() {
                    reply
                        .lines
                        .push("Can only set the port if the server is closed".to_string());
                } else {
                    match argument.as_deref().and_then(command::parse_port) {
                        Some(port) => {
                            self.port = port;
                            reply.lines.push(format!("Setting new port: {port}"));
                        }
                        None => reply.lines.push("Invalid port input".to_string()),
                    }
                }
            }
            ServerCommand::Start => {
                if self.accept.is_some() {
                    reply.lines.push("You are already listening".to_string());
                } else {
                    match self.start_listening().await {
                        Ok(()) => {
                            let notice = "The server has started listening for new clients";
                            self.broadcast(notice);
                            reply.lines.push(notice.to_string());
                        }
                        Err(e) => {
                            error!("could not bind listener on port {}: {e}", self.port);
                            reply
                                .lines
                                .push("ERROR - Could not listen for clients!".to_string());
                        }
                    }
                }
            }
            ServerCommand::GetPort => {
                reply.lines.push(self.port.to_string());
            }
            ServerCommand::Unknown(cmd) => {
                debug!("unknown operator command {cmd}");
                reply
                    .lines
                    .push("Invalid command, valid commands are the following:".to_string());
                for usage in command::SERVER_USAGE {
                    reply.lines.push(usage.to_string());
                }
            }
        }
        reply
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// Port 0 resolves to an OS-assigned port, which becomes the reported
    /// port from then on.
    async fn start_listening(&mut self) -> Result<(), AppError> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        self.port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(accept_loop(listener, self.cmd_tx.clone(), shutdown_rx));
        self.accept = Some(AcceptLoop {
            shutdown: shutdown_tx,
            handle,
        });

        info!("Server listening for connections on port {}", self.port);
        Ok(())
    }

    /// Stop the accept loop and release the listener.
    ///
    /// Joins the accept task before returning, so the port is free when
    /// this resolves. No-op when already stopped.
    async fn stop_listening(&mut self) {
        let Some(accept) = self.accept.take() else {
            return;
        };
        let _ = accept.shutdown.send(true);
        if let Err(e) = accept.handle.await {
            error!("accept loop task failed: {e}");
        }
        info!("Server has stopped listening for connections");
    }

    /// Broadcast a line to every connection, logging peers whose sessions
    /// died under it
    fn broadcast(&mut self, line: &str) {
        for id in self.registry.broadcast(line) {
            info!("A client has disconnected from the server (connection {id})");
        }
    }
}

/// Accept connections until the shutdown signal flips.
///
/// Each accepted stream gets its own session task wired to the control
/// actor.
async fn accept_loop(
    listener: TcpListener,
    cmd_tx: mpsc::Sender<ControlCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                debug!("accept loop shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        debug!("accepted connection from {addr}");
                        let cmd_tx = cmd_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = session::handle_connection(stream, cmd_tx).await {
                                error!("connection handler error: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        error!("failed to accept connection: {e}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_control(port: u16) -> ControlHandle {
        let (control, handle) = ServerControl::new(port);
        tokio::spawn(control.run());
        handle
    }

    #[tokio::test]
    async fn test_setport_then_getport_while_stopped() {
        let handle = spawn_control(DEFAULT_PORT);

        let reply = handle.console_line("#setport 7000").await.unwrap();
        assert_eq!(reply.lines, vec!["Setting new port: 7000"]);

        let reply = handle.console_line("#getport").await.unwrap();
        assert_eq!(reply.lines, vec!["7000"]);
    }

    #[tokio::test]
    async fn test_setport_rejected_while_listening() {
        let handle = spawn_control(0);

        handle.console_line("#start").await.unwrap();
        let reply = handle.console_line("#setport 7000").await.unwrap();
        assert_eq!(
            reply.lines,
            vec!["Can only set the port if the server is closed"]
        );

        // Port unchanged: still the one the OS assigned, not 7000
        let reply = handle.console_line("#getport").await.unwrap();
        assert_ne!(reply.lines, vec!["7000"]);

        handle.console_line("#close").await.unwrap();
    }

    #[tokio::test]
    async fn test_setport_invalid_input() {
        let handle = spawn_control(DEFAULT_PORT);

        let reply = handle.console_line("#setport seven").await.unwrap();
        assert_eq!(reply.lines, vec!["Invalid port input"]);

        let reply = handle.console_line("#setport").await.unwrap();
        assert_eq!(reply.lines, vec!["Invalid port input"]);

        // Brackets are stripped before parsing
        let reply = handle.console_line("#setport <7001>").await.unwrap();
        assert_eq!(reply.lines, vec!["Setting new port: 7001"]);
    }

    #[tokio::test]
    async fn test_start_twice_reports_already_listening() {
        let handle = spawn_control(0);

        let reply = handle.console_line("#start").await.unwrap();
        assert_eq!(
            reply.lines,
            vec!["The server has started listening for new clients"]
        );

        let reply = handle.console_line("#start").await.unwrap();
        assert_eq!(reply.lines, vec!["You are already listening"]);

        handle.console_line("#close").await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let handle = spawn_control(DEFAULT_PORT);

        let reply = handle.console_line("#stop").await.unwrap();
        assert!(reply.lines.is_empty());
        assert!(!reply.quit);
    }

    #[tokio::test]
    async fn test_stop_then_start_round_trip() {
        let handle = spawn_control(0);

        handle.console_line("#start").await.unwrap();
        let reply = handle.console_line("#stop").await.unwrap();
        assert_eq!(
            reply.lines,
            vec!["The server has stopped listening for new clients"]
        );

        // Stopped again: port changes are permitted now
        let reply = handle.console_line("#setport 0").await.unwrap();
        assert_eq!(reply.lines, vec!["Setting new port: 0"]);

        let reply = handle.console_line("#start").await.unwrap();
        assert_eq!(
            reply.lines,
            vec!["The server has started listening for new clients"]
        );
        handle.console_line("#close").await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_command_reports_usage() {
        let handle = spawn_control(DEFAULT_PORT);

        let reply = handle.console_line("#frobnicate").await.unwrap();
        assert_eq!(
            reply.lines[0],
            "Invalid command, valid commands are the following:"
        );
        assert!(reply.lines.contains(&"#setport <port>".to_string()));
        assert_eq!(reply.lines.len(), 1 + command::SERVER_USAGE.len());
    }

    #[tokio::test]
    async fn test_quit_sets_quit_flag() {
        let handle = spawn_control(DEFAULT_PORT);

        let reply = handle.console_line("#quit").await.unwrap();
        assert!(reply.quit);
        assert!(reply.lines.is_empty());

        // The actor is gone afterwards
        assert!(handle.console_line("#getport").await.is_err());
    }

    #[tokio::test]
    async fn test_operator_message_is_reported() {
        let handle = spawn_control(DEFAULT_PORT);

        let reply = handle.console_line("maintenance at noon").await.unwrap();
        assert_eq!(reply.lines, vec!["SERVER MSG> maintenance at noon"]);
    }
}
