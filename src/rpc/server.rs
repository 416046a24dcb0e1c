//! WebSocket listener for the JSON-RPC endpoint.
//!
//! One acceptor thread, then one thread per client that owns its socket
//! for both directions (see `client`).

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use super::client;
use super::dispatch::Dispatcher;
use crate::core::is_shutdown;

const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Bind `addr` and start accepting. Returns the bound address.
///
/// A port already in use is a startup failure, not something to route
/// around: the UI has to know where to connect.
pub fn start_rpc_server(addr: SocketAddr, dispatcher: Arc<Dispatcher>) -> Result<SocketAddr> {
    let listener =
        TcpListener::bind(addr).with_context(|| format!("cannot listen on {addr}"))?;
    let local = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    thread::Builder::new()
        .name("rpc-accept".into())
        .spawn(move || accept_loop(listener, dispatcher))
        .context("failed to spawn rpc acceptor")?;

    Ok(local)
}

fn accept_loop(listener: TcpListener, dispatcher: Arc<Dispatcher>) {
    while !is_shutdown() {
        match listener.accept() {
            Ok((stream, peer)) => {
                crate::debug!("rpc"; "connection from {}", peer);
                // Set blocking for WebSocket operations
                let _ = stream.set_nonblocking(false);

                let dispatcher = Arc::clone(&dispatcher);
                let spawned = thread::Builder::new()
                    .name(format!("rpc-{peer}"))
                    .spawn(move || client::serve(stream, peer, &dispatcher));
                if let Err(e) = spawned {
                    crate::log!("rpc"; "cannot serve {}: {}", peer, e);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                crate::log!("rpc"; "accept error: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    crate::debug!("rpc"; "acceptor stopped");
}
