//! Method handlers.
//!
//! Reads go straight to the lock-free snapshots; anything that changes
//! state is forwarded to the reconciler and waited on. Handlers run on
//! connection threads, so waiting blocks only the calling client.

use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::hub::{Hub, Mailbox};
use super::protocol::{RpcError, failure, parse_request, success, to_value};
use super::schema::{self, Call};
use crate::actor::messages::ReconcilerMsg;
use crate::actor::reconciler::StatusBoard;
use crate::config::SiteConfig;
use crate::content::{ContentModel, EditOutcome};
use crate::core::SiteError;

/// Static part of `getSiteInfo`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteInfo {
    pub name: String,
    pub root: PathBuf,
    pub content_dir: String,
    pub output_dir: PathBuf,
    /// Extensions treated as editable content
    pub formats: Vec<String>,
    pub generator: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

impl SiteInfo {
    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            name: config.site_name(),
            root: config.root.clone(),
            content_dir: config.content.dir.clone(),
            output_dir: config.output_dir(),
            formats: config.content.formats.clone(),
            generator: config.generator.command.clone(),
            preview_url: config
                .serve
                .preview_addr()
                .map(|addr| format!("http://{addr}/")),
        }
    }
}

pub struct Dispatcher {
    info: SiteInfo,
    model: Arc<ContentModel>,
    board: Arc<StatusBoard>,
    hub: Arc<Hub>,
    reconciler_tx: mpsc::Sender<ReconcilerMsg>,
}

impl Dispatcher {
    pub fn new(
        info: SiteInfo,
        model: Arc<ContentModel>,
        board: Arc<StatusBoard>,
        hub: Arc<Hub>,
        reconciler_tx: mpsc::Sender<ReconcilerMsg>,
    ) -> Self {
        Self {
            info,
            model,
            board,
            hub,
            reconciler_tx,
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Handle one inbound frame from `mailbox`'s client.
    ///
    /// Returns the reply, or `None` for a notification (a request without id).
    pub fn handle(&self, mailbox: &Mailbox, text: &str) -> Option<String> {
        let request = match parse_request(text) {
            Ok(request) => request,
            Err((id, error)) => return Some(failure(id, &error)),
        };

        crate::debug!("rpc"; "client {} → {}", mailbox.id, request.method);
        let result = schema::validate(&request.method, request.params)
            .and_then(|call| self.call(mailbox, call));

        let id = request.id?;
        Some(match result {
            Ok(value) => success(id, value),
            Err(error) => failure(id, &error),
        })
    }

    fn call(&self, mailbox: &Mailbox, call: Call) -> Result<Value, RpcError> {
        match call {
            Call::GetSiteInfo => {
                let mut info = to_value(&self.info);
                info["version"] = json!(self.model.version());
                Ok(info)
            }
            Call::GetSchema => Ok(schema::document()),
            Call::GetTree => {
                let tree = self.model.snapshot();
                let nodes: Vec<_> = tree.iter().map(|node| node.view(false)).collect();
                Ok(json!({ "version": tree.version(), "nodes": nodes }))
            }
            Call::GetNode { path } => {
                let rel = self.model.validate_path(&path)?;
                let tree = self.model.snapshot();
                let node = tree
                    .get(&rel)
                    .ok_or_else(|| SiteError::NotFound(rel.clone()))?;
                Ok(to_value(&node.view(true)))
            }
            Call::ApplyEdit { path, content } => {
                // Reject bad paths here so they never queue behind builds.
                self.model.validate_path(&path)?;
                let outcome = self.ask(|reply| ReconcilerMsg::Edit {
                    path,
                    content,
                    reply,
                })??;
                Ok(edit_result(&outcome))
            }
            Call::RequestBuild { paths } => {
                let paths = self.existing_paths(&paths)?;
                let job = self.ask(|reply| ReconcilerMsg::RequestBuild { paths, reply })?;
                Ok(to_value(&job))
            }
            Call::CancelBuild { seq } => {
                let job = self.ask(|reply| ReconcilerMsg::CancelBuild { seq, reply })??;
                Ok(to_value(&job))
            }
            Call::GetBuildStatus => Ok(to_value(&*self.board.load())),
            Call::Subscribe { topics } => {
                self.hub.subscribe(mailbox, topics.iter().copied());
                Ok(json!({ "topics": topics, "version": self.model.version() }))
            }
            Call::Unsubscribe => Ok(json!(self.hub.unsubscribe(mailbox.id))),
        }
    }

    /// Normalize build paths, sorted and deduplicated. Each must name a node.
    fn existing_paths(&self, paths: &[String]) -> Result<Vec<String>, SiteError> {
        let tree = self.model.snapshot();
        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let rel = self.model.validate_path(path)?;
            if tree.get(&rel).is_none() {
                return Err(SiteError::NotFound(rel));
            }
            out.push(rel);
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// Send a request to the reconciler and wait for its reply.
    fn ask<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ReconcilerMsg,
    ) -> Result<T, RpcError> {
        let (reply, rx) = oneshot::channel();
        self.reconciler_tx
            .blocking_send(make(reply))
            .map_err(|_| RpcError::internal("site is shutting down"))?;
        rx.blocking_recv()
            .map_err(|_| RpcError::internal("site is shutting down"))
    }
}

fn edit_result(outcome: &EditOutcome) -> Value {
    json!({
        "version": outcome.summary.version,
        "node": outcome.node.as_ref().map(|node| node.view(true)),
        "changed": outcome.summary.changed,
        "conflicts": outcome.summary.conflicts,
        "triggersBuild": outcome.summary.triggers_build,
    })
}
