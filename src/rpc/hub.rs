//! Subscription hub.
//!
//! Every connected client owns an unbounded queue. The reconciler publishes
//! events here; the client's connection thread drains its queue between
//! reads. Ordering holds within one queue only.

use crossbeam::channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use super::protocol::notification;
use crate::actor::messages::{SiteEvent, Topic};

pub type ClientId = u64;

struct Subscription {
    topics: FxHashSet<Topic>,
    tx: Sender<String>,
}

#[derive(Default)]
pub struct Hub {
    next_id: AtomicU64,
    subscriptions: Mutex<FxHashMap<ClientId, Subscription>>,
}

/// A client's end: its id and the queue its notifications land in.
pub struct Mailbox {
    pub id: ClientId,
    tx: Sender<String>,
    pub rx: Receiver<String>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id and a queue for a new connection.
    pub fn connect(&self) -> Mailbox {
        let (tx, rx) = unbounded();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Mailbox { id, tx, rx }
    }

    /// Start (or replace) `mailbox`'s subscription.
    pub fn subscribe(&self, mailbox: &Mailbox, topics: impl IntoIterator<Item = Topic>) {
        let topics: FxHashSet<Topic> = topics.into_iter().collect();
        crate::debug!("rpc"; "client {} subscribed to {:?}", mailbox.id, topics);
        self.subscriptions.lock().insert(
            mailbox.id,
            Subscription {
                topics,
                tx: mailbox.tx.clone(),
            },
        );
    }

    /// Returns whether there was a subscription to end.
    pub fn unsubscribe(&self, id: ClientId) -> bool {
        self.subscriptions.lock().remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Queue `event` for every subscriber of its topic.
    pub fn publish(&self, event: &SiteEvent) {
        let topic = event.topic();
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.is_empty() {
            return;
        }

        let text = notification(event);
        subscriptions.retain(|id, sub| {
            if !sub.topics.contains(&topic) {
                return true;
            }
            let alive = sub.tx.send(text.clone()).is_ok();
            if !alive {
                crate::debug!("rpc"; "dropping subscription of gone client {}", id);
            }
            alive
        });
    }
}
