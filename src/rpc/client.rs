use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use super::dispatch::Dispatcher;
use super::protocol::{INVALID_REQUEST, RpcError, failure};
use crate::core::is_shutdown;

/// How long a read may block before queued notifications are flushed.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Serve one client until it disconnects or the process shuts down.
///
/// Requests are answered in arrival order. Between reads, everything queued
/// for this client by the hub is written out, so notifications keep their
/// order relative to each other.
pub(super) fn serve(stream: TcpStream, peer: SocketAddr, dispatcher: &Dispatcher) {
    let mut ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            crate::log!("rpc"; "handshake with {} failed: {}", peer, e);
            return;
        }
    };
    if let Err(e) = ws.get_ref().set_read_timeout(Some(POLL_INTERVAL)) {
        crate::log!("rpc"; "cannot poll {}: {}", peer, e);
        return;
    }

    let mailbox = dispatcher.hub().connect();
    crate::debug!("rpc"; "client {} connected from {}", mailbox.id, peer);

    loop {
        if mailbox
            .rx
            .try_iter()
            .any(|text| send(&mut ws, text).is_err())
        {
            break;
        }
        if is_shutdown() {
            let _ = ws.close(None);
            let _ = ws.flush();
            break;
        }

        let reply = match ws.read() {
            Ok(Message::Text(text)) => dispatcher.handle(&mailbox, text.as_str()),
            Ok(Message::Binary(_)) => Some(failure(
                serde_json::Value::Null,
                &RpcError::new(INVALID_REQUEST, "binary frames are not supported"),
            )),
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by tungstenite itself.
            Ok(_) => None,
            Err(tungstenite::Error::Io(ref e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                None
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => break,
            Err(e) => {
                crate::debug!("rpc"; "client {} read error: {}", mailbox.id, e);
                break;
            }
        };

        if let Some(reply) = reply
            && send(&mut ws, reply).is_err()
        {
            break;
        }
    }

    dispatcher.hub().unsubscribe(mailbox.id);
    crate::debug!("rpc"; "client {} disconnected", mailbox.id);
}

fn send(ws: &mut WebSocket<TcpStream>, text: String) -> tungstenite::Result<()> {
    ws.send(Message::Text(text.into())).inspect_err(|e| {
        crate::debug!("rpc"; "send failed: {}", e);
    })
}
