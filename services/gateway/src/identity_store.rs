//! Default in-process [`SessionIdentityStore`] for solo deployments.
//!
//! Production multi-node deployments back this with durable storage outside
//! this crate's scope (§1); this implementation is what a standalone node
//! wires up by default, and what the test harness builds on when it needs a
//! real (non-scripted) identity store rather than
//! `gw_test_support::MockSessionIdentityStore`.

use std::collections::{HashMap, HashSet};

use gw_protocol::identity::{LogonOutcome, SessionIdentityStore};
use gw_protocol::ids::{CompositeKey, SessionId};

#[derive(Debug, Default)]
pub struct InMemorySessionIdentityStore {
    assigned: HashMap<CompositeKey, SessionId>,
    active: HashSet<CompositeKey>,
    next_session_id: u64,
}

impl InMemorySessionIdentityStore {
    pub fn new() -> Self {
        InMemorySessionIdentityStore {
            assigned: HashMap::new(),
            active: HashSet::new(),
            next_session_id: 1,
        }
    }
}

impl SessionIdentityStore for InMemorySessionIdentityStore {
    fn on_logon(&mut self, key: &CompositeKey) -> LogonOutcome {
        if self.active.contains(key) {
            return LogonOutcome::DuplicateSession;
        }
        let session_id = match self.assigned.get(key) {
            Some(id) => *id,
            None => {
                let id = SessionId(self.next_session_id);
                self.next_session_id += 1;
                self.assigned.insert(key.clone(), id);
                id
            }
        };
        self.active.insert(key.clone());
        LogonOutcome::Assigned(session_id)
    }

    /// Clears the active mark for `key` so a future logon is treated as a
    /// reconnect rather than a duplicate. Called on disconnect/release.
    fn release(&mut self, key: &CompositeKey) {
        self.active.remove(key);
    }
}
