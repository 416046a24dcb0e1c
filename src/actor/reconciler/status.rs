use arc_swap::ArcSwap;
use std::sync::Arc;

use super::scheduler::BuildStatus;

/// Latest build status, written by the reconciler and read lock-free by RPC.
pub struct StatusBoard {
    current: ArcSwap<BuildStatus>,
}

impl StatusBoard {
    pub fn new(initial: BuildStatus) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    pub fn load(&self) -> Arc<BuildStatus> {
        self.current.load_full()
    }

    pub(super) fn publish(&self, status: BuildStatus) {
        self.current.store(Arc::new(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::reconciler::scheduler::SiteState;
    use crate::build::{BuildJob, Trigger};

    fn status(state: SiteState, version: u64) -> BuildStatus {
        BuildStatus {
            state,
            version,
            queued: None,
            running: None,
            latest: None,
            recent: Vec::new(),
        }
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let board = StatusBoard::new(status(SiteState::Dirty, 1));
        let before = board.load();
        board.publish(status(SiteState::Clean, 2));

        assert_eq!(before.state, SiteState::Dirty);
        assert_eq!(board.load().version, 2);
    }

    #[test]
    fn test_wire_shape() {
        let mut value = status(SiteState::DirtyWhileBuilding, 6);
        value.queued = Some(BuildJob::new(4, Trigger::UiEdit, 6));

        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["state"], "dirty-while-building");
        assert_eq!(json["queued"]["seq"], 4);
        assert_eq!(json["queued"]["trigger"], "ui-edit");
        assert!(json["running"].is_null());
        assert_eq!(json["recent"], serde_json::json!([]));
    }
}
