//! Chat client control
//!
//! Owns one outbound session to the server: connection lifecycle, the
//! fixed login identity, and the client-side command interpreter applied
//! to local console input.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info};

use crate::command::{self, ClientCommand};
use crate::error::AppError;

/// The default host to connect to
pub const DEFAULT_HOST: &str = "localhost";

/// The default port to connect on
pub const DEFAULT_PORT: u16 = 5555;

/// Sink for text shown to the user
///
/// The seam between the client core and whatever renders output (stdout
/// in the binary, a channel in tests). Inbound server lines are handed
/// over unmodified.
pub trait ChatDisplay: Send + Sync {
    fn display(&self, message: &str);
}

/// What the caller should do after one line of console input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOutcome {
    /// Keep reading console input
    Continue,
    /// Terminate the client process (exit code 0)
    Quit,
}

type LineSink = SplitSink<Framed<TcpStream, LinesCodec>, String>;
type LineStream = SplitStream<Framed<TcpStream, LinesCodec>>;

/// One live connection to the server
struct ClientConnection {
    sink: LineSink,
    /// Forwards inbound lines to the display sink
    _reader: JoinHandle<()>,
    /// Cleared by the reader when the server side goes away
    open: Arc<AtomicBool>,
}

/// The chat client
///
/// Identity is fixed at construction and resent on every `#login`
/// reconnect. Host and port are mutable only while disconnected.
pub struct ChatClient {
    id: String,
    host: String,
    port: u16,
    connection: Option<ClientConnection>,
    display: Arc<dyn ChatDisplay>,
}

impl ChatClient {
    /// Create a disconnected client; call [`connect`](Self::connect) to
    /// open the session and send the login line.
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        display: Arc<dyn ChatDisplay>,
    ) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            connection: None,
            display,
        }
    }

    /// Open the connection and announce the login identity.
    pub async fn connect(&mut self) -> Result<(), AppError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let framed = Framed::new(stream, LinesCodec::new());
        let (sink, lines) = framed.split();

        let open = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_loop(lines, Arc::clone(&self.display), Arc::clone(&open)));

        self.connection = Some(ClientConnection {
            sink,
            _reader: reader,
            open,
        });

        let login = format!("#login <{}>", self.id);
        self.send_to_server(&login).await?;

        info!("connected to {}:{} as {}", self.host, self.port, self.id);
        Ok(())
    }

    /// Whether a connection is open and the server side is still there
    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.open.load(Ordering::SeqCst))
    }

    /// The configured server host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The configured server port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Send one line to the server.
    pub async fn send_to_server(&mut self, line: &str) -> Result<(), AppError> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(AppError::NotConnected);
        };
        connection.sink.send(line.to_string()).await?;
        Ok(())
    }

    /// Close the connection, if any.
    ///
    /// The reader task ends on its own once the stream closes, emitting
    /// the connection-closed notice.
    pub async fn close_connection(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        let _ = connection.sink.close().await;
        debug!("connection closed");
    }

    /// Interpret one line of console input.
    ///
    /// Non-command text is forwarded verbatim to the server; `#` commands
    /// mutate the client session. Returns whether the caller should keep
    /// going or terminate.
    pub async fn handle_input(&mut self, line: &str) -> ClientOutcome {
        match ClientCommand::parse(line) {
            ClientCommand::Message(text) => {
                if text.trim().is_empty() {
                    return ClientOutcome::Continue;
                }
                if let Err(e) = self.send_to_server(&text).await {
                    debug!("forwarding failed: {e}");
                    self.display
                        .display("Could not send message to server.  Terminating client.");
                    self.close_connection().await;
                    return ClientOutcome::Quit;
                }
                ClientOutcome::Continue
            }
            ClientCommand::Quit => {
                let _ = self.send_to_server("#quit").await;
                self.close_connection().await;
                ClientOutcome::Quit
            }
            ClientCommand::Logoff => {
                self.display.display("Logging off. Disconnected from Server.");
                let _ = self.send_to_server("#logoff").await;
                self.close_connection().await;
                ClientOutcome::Continue
            }
            ClientCommand::SetHost(argument) => {
                if self.is_connected() {
                    self.display.display(
                        "Cannot set host while you are connected. First #logoff to use #sethost.",
                    );
                    return ClientOutcome::Continue;
                }
                let host = argument.as_deref().map(command::strip_brackets);
                match host {
                    Some(host) if !host.is_empty() => {
                        self.display.display(&format!("Setting new host: {host}"));
                        self.host = host;
                    }
                    _ => self.display.display("Invalid host input"),
                }
                ClientOutcome::Continue
            }
            ClientCommand::SetPort(argument) => {
                if self.is_connected() {
                    self.display.display(
                        "Cannot set the port while you are connected. First #logoff to use #setport",
                    );
                    return ClientOutcome::Continue;
                }
                match argument.as_deref().and_then(command::parse_port) {
                    Some(port) => {
                        self.display.display(&format!("Setting new port: {port}"));
                        self.port = port;
                    }
                    None => self.display.display("Invalid port input"),
                }
                ClientOutcome::Continue
            }
            ClientCommand::Login => {
                if self.is_connected() {
                    self.display.display("You are already logged in.");
                } else if let Err(e) = self.connect().await {
                    self.display
                        .display(&format!("Could not connect to server: {e}"));
                }
                ClientOutcome::Continue
            }
            ClientCommand::GetHost => {
                self.display.display(&self.host);
                ClientOutcome::Continue
            }
            ClientCommand::GetPort => {
                self.display.display(&self.port.to_string());
                ClientOutcome::Continue
            }
            ClientCommand::Unknown(cmd) => {
                debug!("unknown client command {cmd}");
                self.display
                    .display("Invalid command, valid commands are the following:");
                for usage in command::CLIENT_USAGE {
                    self.display.display(usage);
                }
                ClientOutcome::Continue
            }
        }
    }
}

/// Forward inbound server lines to the display until the stream ends.
///
/// Clean closure and transport failure get distinct notices; neither
/// attempts reconnection.
async fn read_loop(mut lines: LineStream, display: Arc<dyn ChatDisplay>, open: Arc<AtomicBool>) {
    loop {
        match lines.next().await {
            Some(Ok(line)) => display.display(&line),
            Some(Err(e)) => {
                debug!("read error from server: {e}");
                display.display("The server has shut down. Disconnecting from the server");
                break;
            }
            None => {
                display.display("Connection with the server has closed.");
                break;
            }
        }
    }
    open.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct ChannelDisplay(mpsc::UnboundedSender<String>);

    impl ChatDisplay for ChannelDisplay {
        fn display(&self, message: &str) {
            let _ = self.0.send(message.to_string());
        }
    }

    fn client() -> (ChatClient, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = ChatClient::new("alice", DEFAULT_HOST, DEFAULT_PORT, Arc::new(ChannelDisplay(tx)));
        (client, rx)
    }

    #[tokio::test]
    async fn test_sethost_while_disconnected() {
        let (mut client, mut display) = client();

        let outcome = client.handle_input("#sethost <example.org>").await;
        assert_eq!(outcome, ClientOutcome::Continue);
        assert_eq!(client.host(), "example.org");
        assert_eq!(display.recv().await.unwrap(), "Setting new host: example.org");
    }

    #[tokio::test]
    async fn test_setport_while_disconnected() {
        let (mut client, mut display) = client();

        client.handle_input("#setport <7000>").await;
        assert_eq!(client.port(), 7000);
        assert_eq!(display.recv().await.unwrap(), "Setting new port: 7000");
    }

    #[tokio::test]
    async fn test_setport_invalid_input() {
        let (mut client, mut display) = client();

        client.handle_input("#setport seven").await;
        assert_eq!(client.port(), DEFAULT_PORT);
        assert_eq!(display.recv().await.unwrap(), "Invalid port input");

        client.handle_input("#setport").await;
        assert_eq!(display.recv().await.unwrap(), "Invalid port input");
    }

    #[tokio::test]
    async fn test_gethost_getport() {
        let (mut client, mut display) = client();

        client.handle_input("#gethost").await;
        assert_eq!(display.recv().await.unwrap(), DEFAULT_HOST);

        client.handle_input("#getport").await;
        assert_eq!(display.recv().await.unwrap(), DEFAULT_PORT.to_string());
    }

    #[tokio::test]
    async fn test_unknown_command_reports_usage() {
        let (mut client, mut display) = client();

        client.handle_input("#frobnicate").await;
        assert_eq!(
            display.recv().await.unwrap(),
            "Invalid command, valid commands are the following:"
        );
        for usage in command::CLIENT_USAGE {
            assert_eq!(display.recv().await.unwrap(), *usage);
        }
    }

    #[tokio::test]
    async fn test_message_without_connection_terminates() {
        let (mut client, mut display) = client();

        let outcome = client.handle_input("hello").await;
        assert_eq!(outcome, ClientOutcome::Quit);
        assert_eq!(
            display.recv().await.unwrap(),
            "Could not send message to server.  Terminating client."
        );
    }

    #[tokio::test]
    async fn test_quit_without_connection_still_quits() {
        let (mut client, _display) = client();

        let outcome = client.handle_input("#quit").await;
        assert_eq!(outcome, ClientOutcome::Quit);
    }

    #[tokio::test]
    async fn test_empty_input_is_skipped() {
        let (mut client, mut display) = client();

        let outcome = client.handle_input("").await;
        assert_eq!(outcome, ClientOutcome::Continue);
        assert!(display.try_recv().is_err());
    }
}
