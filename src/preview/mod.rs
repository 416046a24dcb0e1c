//! Static preview of the generator's output directory.
//!
//! Optional: started only when `serve.preview_port` is set. Serves whatever
//! the last build left on disk; it never triggers builds itself.

mod path;
mod response;


use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use tiny_http::{Method, Request, Server};

use crate::core::{is_shutdown, register_preview};

const WORKERS: usize = 4;

/// Bind `addr` and serve `output` from a background thread.
///
/// Returns the bound address. Binding failures are fatal to startup, the
/// same as for the RPC listener.
pub fn start_preview(addr: SocketAddr, output: PathBuf) -> Result<SocketAddr> {
    let server = Server::http(addr).map_err(|e| anyhow!("cannot serve preview on {addr}: {e}"))?;
    let local = server
        .server_addr()
        .to_ip()
        .context("preview server is not bound to an IP address")?;
    let server = Arc::new(server);
    register_preview(Arc::clone(&server));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(WORKERS)
        .thread_name(|i| format!("preview-{i}"))
        .build()
        .context("failed to create preview thread pool")?;

    thread::Builder::new()
        .name("preview".into())
        .spawn(move || run_request_loop(&server, &pool, &output))
        .context("failed to spawn preview server")?;

    Ok(local)
}

fn run_request_loop(server: &Server, pool: &rayon::ThreadPool, output: &Path) {
    for request in server.incoming_requests() {
        let output = output.to_path_buf();
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &output) {
                crate::debug!("preview"; "request error: {}", e);
            }
        });
    }
    crate::debug!("preview"; "stopped");
}

fn handle_request(request: Request, output: &Path) -> Result<()> {
    if is_shutdown() {
        return response::respond_unavailable(request);
    }
    if !matches!(request.method(), Method::Get | Method::Head) {
        return response::respond_method_not_allowed(request);
    }

    match path::resolve_path(request.url(), output) {
        Some(file) => response::respond_file(request, &file),
        None => response::respond_not_found(request, output),
    }
}
