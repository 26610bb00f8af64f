//! Server-side connection session
//!
//! One task per accepted connection: frames the stream into lines, feeds
//! inbound traffic to the control actor, and drains the connection's
//! outbound queue into the socket.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, warn};

use crate::command::Inbound;
use crate::control::ControlCommand;
use crate::error::AppError;
use crate::types::ConnectionId;

/// Drive one accepted connection until it closes.
///
/// Registers the connection with the control actor, then loops over
/// inbound frames and the outbound queue. The loop ends when the peer
/// hangs up, a write fails, or the registry drops this connection's
/// queue (`#close`). Errors never propagate past the session; the
/// connection is deregistered on every exit path.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ControlCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let id = ConnectionId::new();
    debug!("new connection {id} from {peer_addr}");

    let framed = Framed::new(stream, LinesCodec::new());
    let (mut sink, mut lines) = framed.split();

    // Outbound queue: the registry holds the sender, we drain the receiver
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    if cmd_tx
        .send(ControlCommand::Connect { id, outbound: out_tx })
        .await
        .is_err()
    {
        debug!("control actor gone, refusing connection {id}");
        return Err(AppError::ChannelSend);
    }

    loop {
        tokio::select! {
            inbound = lines.next() => {
                match inbound {
                    Some(Ok(line)) => {
                        let command = match Inbound::parse(&line) {
                            Some(Inbound::Login(argument)) => {
                                ControlCommand::Login { id, argument }
                            }
                            Some(Inbound::Chat(line)) => {
                                ControlCommand::Chat { id, line }
                            }
                            None => {
                                warn!("connection {id} sent a command with no argument; ignoring");
                                continue;
                            }
                        };
                        if cmd_tx.send(command).await.is_err() {
                            debug!("control actor gone, ending session {id}");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("read error on connection {id}: {e}");
                        break;
                    }
                    None => {
                        debug!("connection {id} closed by peer");
                        break;
                    }
                }
            }
            outbound = out_rx.recv() => {
                match outbound {
                    Some(line) => {
                        if let Err(e) = sink.send(line).await {
                            debug!("send failed on connection {id}: {e}");
                            break;
                        }
                    }
                    // Deregistered: the server dropped our queue
                    None => {
                        debug!("connection {id} deregistered, closing");
                        break;
                    }
                }
            }
        }
    }

    let _ = cmd_tx.send(ControlCommand::Disconnect { id }).await;
    debug!("session ended for connection {id}");

    Ok(())
}
