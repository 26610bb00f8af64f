//! Command interpreter for console input and inbound protocol lines
//!
//! Both consoles speak the same shape: a `#`-prefixed command token
//! optionally followed by one argument token. Anything not starting with
//! `#` is a plain chat/operator message. Arguments may be wrapped in
//! literal angle brackets (`<value>`), which receivers strip before use.

/// Commands the server operator console understands.
///
/// Arguments are carried raw (brackets not yet stripped); the control
/// actor resolves them so state-dependent diagnostics come first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    /// Terminate the server process
    Quit,
    /// Stop accepting new connections, keep existing ones
    Stop,
    /// Stop listening and terminate every connection
    Close,
    /// Change the listening port (only while stopped)
    SetPort(Option<String>),
    /// Begin listening for new connections
    Start,
    /// Report the current port
    GetPort,
    /// Plain text, broadcast to all clients as an operator message
    Message(String),
    /// Unrecognized `#` command
    Unknown(String),
}

impl ServerCommand {
    /// Parse one operator console line.
    pub fn parse(line: &str) -> Self {
        if !line.starts_with('#') {
            return Self::Message(line.to_string());
        }
        let (command, argument) = split_command(line);
        match command {
            "#quit" => Self::Quit,
            "#stop" => Self::Stop,
            "#close" => Self::Close,
            "#setport" => Self::SetPort(argument.map(str::to_string)),
            "#start" => Self::Start,
            "#getport" => Self::GetPort,
            _ => Self::Unknown(command.to_string()),
        }
    }
}

/// Commands the chat client console understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Notify the server, close the connection, terminate the process
    Quit,
    /// Notify the server and close the connection, stay running
    Logoff,
    /// Change the server host (only while disconnected)
    SetHost(Option<String>),
    /// Change the server port (only while disconnected)
    SetPort(Option<String>),
    /// Reopen the connection and resend the login line
    Login,
    /// Report the current host
    GetHost,
    /// Report the current port
    GetPort,
    /// Plain text, forwarded verbatim to the server
    Message(String),
    /// Unrecognized `#` command
    Unknown(String),
}

impl ClientCommand {
    /// Parse one client console line.
    pub fn parse(line: &str) -> Self {
        if !line.starts_with('#') {
            return Self::Message(line.to_string());
        }
        let (command, argument) = split_command(line);
        match command {
            "#quit" => Self::Quit,
            "#logoff" => Self::Logoff,
            "#sethost" => Self::SetHost(argument.map(str::to_string)),
            "#setport" => Self::SetPort(argument.map(str::to_string)),
            "#login" => Self::Login,
            "#gethost" => Self::GetHost,
            "#getport" => Self::GetPort,
            _ => Self::Unknown(command.to_string()),
        }
    }
}

/// How the server interprets one inbound line from a client connection.
///
/// Only `#login` is a protocol command; every other line - including other
/// `#`-prefixed text - is relayed as chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// `#login <identity>`, argument carried raw
    Login(String),
    /// Anything else, carried verbatim
    Chat(String),
}

impl Inbound {
    /// Interpret one inbound line.
    ///
    /// Returns `None` for a `#login` with no argument token: the command
    /// is malformed and must be skipped, never crash the session loop.
    pub fn parse(line: &str) -> Option<Self> {
        let (command, argument) = split_command(line);
        if command == "#login" {
            argument.map(|a| Self::Login(a.to_string()))
        } else {
            Some(Self::Chat(line.to_string()))
        }
    }
}

/// Valid operator console commands, in the order the usage listing shows.
pub const SERVER_USAGE: &[&str] = &[
    "#quit",
    "#stop",
    "#close",
    "#setport <port>",
    "#start",
    "#getport",
];

/// Valid client console commands, in the order the usage listing shows.
pub const CLIENT_USAGE: &[&str] = &[
    "#quit",
    "#logoff",
    "#sethost <host>",
    "#setport <port>",
    "#login",
    "#gethost",
    "#getport",
];

/// Split a line into its command token and optional single argument token.
///
/// The protocol carries at most one argument; any further tokens are
/// ignored.
fn split_command(line: &str) -> (&str, Option<&str>) {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("");
    (command, parts.next())
}

/// Remove every literal `<` and `>` from a raw argument.
pub fn strip_brackets(raw: &str) -> String {
    raw.chars().filter(|c| *c != '<' && *c != '>').collect()
}

/// Parse a port argument, stripping angle brackets first.
///
/// Returns `None` for anything that is not a valid port number.
pub fn parse_port(raw: &str) -> Option<u16> {
    strip_brackets(raw).parse().ok()
}
