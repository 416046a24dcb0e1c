//! Process-wide shutdown state.
//!
//! - `SHUTDOWN`: has Ctrl+C been received?
//! - the preview server handle, unblocked on shutdown
//! - the shutdown channel the coordinator waits on

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam::channel::{Receiver, Sender};
use tiny_http::Server;

/// Shutdown has been requested (Ctrl+C received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Preview server reference for graceful shutdown
static PREVIEW: OnceLock<Arc<Server>> = OnceLock::new();

/// Shutdown signal sender for the actor system
static SHUTDOWN_TX: OnceLock<Sender<()>> = OnceLock::new();

/// Setup the global Ctrl+C handler. Call once at program start.
///
/// Returns the receiver the coordinator waits on.
pub fn setup_shutdown_handler() -> anyhow::Result<Receiver<()>> {
    let (tx, rx) = crossbeam::channel::unbounded();
    let _ = SHUTDOWN_TX.set(tx);

    ctrlc::set_handler(|| {
        if SHUTDOWN.swap(true, Ordering::SeqCst) {
            // Second Ctrl+C: stop waiting for a graceful exit.
            std::process::exit(130);
        }
        crate::log!("serve"; "shutting down...");
        request_shutdown();
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))?;

    Ok(rx)
}

/// Trigger the same path as Ctrl+C.
pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);
    if let Some(tx) = SHUTDOWN_TX.get() {
        let _ = tx.send(());
    }
    if let Some(server) = PREVIEW.get() {
        server.unblock();
    }
}

/// Register the preview server so shutdown can unblock its request loop.
pub fn register_preview(server: Arc<Server>) {
    let _ = PREVIEW.set(server);
}

/// Check if shutdown has been requested
///
/// Relaxed: worst case a few more items are processed before stopping.
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}
