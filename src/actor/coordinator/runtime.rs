use std::time::Duration;

use anyhow::{Result, anyhow};
use crossbeam::channel::{Receiver, TryRecvError};
use tokio::sync::mpsc;

use crate::actor::fs::FsActor;
use crate::actor::messages::ReconcilerMsg;
use crate::actor::reconciler::ReconcilerActor;

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);
/// Time to persist build history once the generator is gone.
const HISTORY_GRACE: Duration = Duration::from_secs(2);

/// How long the reconciler gets after `Shutdown`: a running generator's
/// SIGTERM grace, draining its output, then saving history.
pub(super) fn shutdown_grace(generator_grace_secs: u64) -> Duration {
    Duration::from_secs(generator_grace_secs.saturating_mul(2)) + HISTORY_GRACE
}

/// Run all actors until shutdown.
///
/// Fails if the reconciler stops before it was asked to.
pub(super) async fn run_actors(
    fs: Option<FsActor>,
    reconciler: ReconcilerActor,
    reconciler_tx: mpsc::Sender<ReconcilerMsg>,
    shutdown_rx: Option<Receiver<()>>,
    grace: Duration,
) -> Result<()> {
    let mut reconciler_handle = tokio::spawn(reconciler.run());
    let fs_handle = fs.map(|fs| tokio::spawn(fs.run()));

    let stopped_early = tokio::select! {
        _ = wait_for_signal(shutdown_rx) => None,
        result = &mut reconciler_handle => Some(result),
    };

    if let Some(handle) = fs_handle {
        handle.abort();
    }
    if let Some(result) = stopped_early {
        return Err(match result {
            Ok(()) => anyhow!("reconciler stopped unexpectedly"),
            Err(e) => anyhow!("reconciler crashed: {e}"),
        });
    }

    crate::debug!("actor"; "sending shutdown to reconciler");
    let _ = reconciler_tx.send(ReconcilerMsg::Shutdown).await;
    if tokio::time::timeout(grace, reconciler_handle).await.is_err() {
        crate::log!("actor"; "reconciler did not stop within {}s", grace.as_secs());
    }
    Ok(())
}

/// Resolve once the Ctrl+C handler fires. Without a receiver, never resolves.
async fn wait_for_signal(rx: Option<Receiver<()>>) {
    let Some(rx) = rx else {
        return std::future::pending().await;
    };
    loop {
        match rx.try_recv() {
            Ok(()) => {
                crate::debug!("actor"; "shutdown signal received");
                return;
            }
            Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => tokio::time::sleep(SHUTDOWN_POLL).await,
        }
    }
}
