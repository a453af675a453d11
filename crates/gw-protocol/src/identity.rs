//! Session Identity Store contract (§6).

use crate::ids::{CompositeKey, SessionId};

/// Outcome of presenting a composite key to the Session Identity Store at
/// logon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogonOutcome {
    /// A session id, freshly assigned or recovered for an existing key.
    Assigned(SessionId),
    /// The composite key is already associated with a *different* live
    /// connection; the caller must reject the logon.
    DuplicateSession,
    /// The store has no session-id allocated yet and none could be minted;
    /// the reserved `MISSING` sentinel.
    Missing,
}

/// Deduplicates FIX sessions by composite key across reconnects.
///
/// Implemented externally to this crate in production (backed by durable
/// storage, §1); the gateway only depends on this trait. No `Send` bound:
/// the Framer owns its collaborators on a single dedicated thread (§5) and
/// never needs to move them across threads.
pub trait SessionIdentityStore {
    fn on_logon(&mut self, key: &CompositeKey) -> LogonOutcome;

    /// Releases `key` so a future logon is treated as a reconnect rather
    /// than a duplicate. Called on disconnect and on engine shutdown (§4.2
    /// `Disconnect`, §5 `on_close`).
    fn release(&mut self, key: &CompositeKey);
}
