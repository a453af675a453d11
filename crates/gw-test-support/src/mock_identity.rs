use std::collections::HashMap;

use gw_protocol::identity::{LogonOutcome, SessionIdentityStore};
use gw_protocol::ids::{CompositeKey, SessionId};

/// A [`SessionIdentityStore`] double. Assigns sequential session ids to new
/// keys, returns the same id on repeat logons for the same key, and can be
/// scripted to answer `DuplicateSession` for a specific key to exercise the
/// rejection path.
#[derive(Debug, Default)]
pub struct MockSessionIdentityStore {
    assigned: HashMap<CompositeKey, SessionId>,
    next_session_id: u64,
    force_duplicate: Vec<CompositeKey>,
}

impl MockSessionIdentityStore {
    pub fn new() -> Self {
        MockSessionIdentityStore {
            assigned: HashMap::new(),
            next_session_id: 1,
            force_duplicate: Vec::new(),
        }
    }

    /// The next logon presenting this exact key reports `DuplicateSession`
    /// regardless of prior assignment.
    pub fn force_duplicate_for(&mut self, key: CompositeKey) {
        self.force_duplicate.push(key);
    }
}

impl SessionIdentityStore for MockSessionIdentityStore {
    fn on_logon(&mut self, key: &CompositeKey) -> LogonOutcome {
        if let Some(pos) = self.force_duplicate.iter().position(|k| k == key) {
            self.force_duplicate.remove(pos);
            return LogonOutcome::DuplicateSession;
        }
        if let Some(existing) = self.assigned.get(key) {
            return LogonOutcome::Assigned(*existing);
        }
        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;
        self.assigned.insert(key.clone(), id);
        LogonOutcome::Assigned(id)
    }

    /// No duplicate-prevention state to clear: this double has no `active`
    /// set (callers script `force_duplicate_for` directly), so release is a
    /// no-op that exists only to satisfy the trait contract.
    fn release(&mut self, _key: &CompositeKey) {}
}
