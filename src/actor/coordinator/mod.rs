//! Actor Coordinator - wires up one site's actor system
//!
//! Startup order matters:
//! 1. the watcher attaches to the site root (events buffer from here on)
//! 2. the reconciler is created; its first act is the initial scan
//! 3. the RPC listener (and optional preview server) bind
//!
//! Any failure in these steps aborts startup.

mod runtime;

use std::sync::Arc;

use anyhow::{Result, anyhow};
use crossbeam::channel::Receiver;
use tokio::sync::mpsc;

use super::fs::FsActor;
use super::messages::ReconcilerMsg;
use super::reconciler::ReconcilerActor;
use crate::config::SiteConfig;
use crate::content::ContentModel;
use crate::rpc::{Dispatcher, Hub, SiteInfo, start_rpc_server};

const CHANNEL_BUFFER: usize = 32;

/// Coordinator - wires up and runs the actor system.
pub struct Coordinator {
    config: Arc<SiteConfig>,
    shutdown_rx: Option<Receiver<()>>,
}

impl Coordinator {
    pub fn with_config(config: Arc<SiteConfig>) -> Self {
        Self {
            config,
            shutdown_rx: None,
        }
    }

    /// Set shutdown signal receiver.
    pub fn with_shutdown_signal(mut self, rx: Receiver<()>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    /// Run until shutdown is signalled or the reconciler stops.
    pub async fn run(mut self) -> Result<()> {
        let config = Arc::clone(&self.config);
        let (reconciler_tx, reconciler_rx) = mpsc::channel::<ReconcilerMsg>(CHANNEL_BUFFER);
        let model = Arc::new(ContentModel::new(&config));
        let hub = Arc::new(Hub::new());

        let fs_actor = if config.watch.enable {
            let actor = FsActor::new(
                vec![config.root.clone()],
                Arc::clone(&model),
                reconciler_tx.clone(),
                &config.watch,
            )
            .map_err(|e| anyhow!("cannot watch {}: {}", config.root.display(), e))?;
            Some(actor)
        } else {
            crate::log!("watch"; "disabled, external edits are picked up on restart");
            None
        };

        let (reconciler, board) =
            ReconcilerActor::new(reconciler_rx, Arc::clone(&model), &config, Arc::clone(&hub));

        let dispatcher = Arc::new(Dispatcher::new(
            SiteInfo::from_config(&config),
            model,
            board,
            hub,
            reconciler_tx.clone(),
        ));
        let rpc_addr = start_rpc_server(config.serve.rpc_addr(), dispatcher)?;
        crate::log!("serve"; "ws://{}", rpc_addr);

        if let Some(addr) = config.serve.preview_addr() {
            let addr = crate::preview::start_preview(addr, config.output_dir())?;
            crate::log!("preview"; "http://{}", addr);
        }

        crate::debug!("actor"; "start");
        let grace = runtime::shutdown_grace(config.generator.grace_secs);
        runtime::run_actors(fs_actor, reconciler, reconciler_tx, self.shutdown_rx.take(), grace)
            .await?;
        crate::debug!("actor"; "stopped");
        Ok(())
    }
}
