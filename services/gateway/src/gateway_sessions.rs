//! Registry of FIX sessions currently owned by the engine, not yet handed
//! off to any library (§2.5, §3 `GatewaySession`).

use std::collections::HashMap;

use gw_protocol::{CompositeKey, ConnectionId, LibraryId, SessionId};

/// Lifecycle state of a [`GatewaySession`] (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Active,
    Released,
}

/// A FIX session retained by the engine.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    pub connection_id: ConnectionId,
    pub session_key: Option<CompositeKey>,
    pub session_id: Option<SessionId>,
    pub state: SessionState,
    pub heartbeat_interval_s: u32,
    pub last_heartbeat_recv_ms: u64,
    pub last_heartbeat_sent_ms: u64,
    pub last_sent_seq: i64,
    pub last_recv_seq: i64,
    /// Set when this entry was reinstated by a library-timeout reclaim
    /// (§4.4), so a subsequent `LibraryConnect` reconnect from the same
    /// library can be told about it via `ControlNotification`.
    pub reclaimed_from: Option<LibraryId>,
}

/// Parameters for [`GatewaySessions::acquire`], grouped the same way
/// `ManageConnectionRecord` is over on the publication side.
#[derive(Debug, Clone)]
pub struct AcquireParams {
    pub connection_id: ConnectionId,
    pub session_key: Option<CompositeKey>,
    pub session_id: Option<SessionId>,
    pub state: SessionState,
    pub heartbeat_interval_s: u32,
    pub last_sent_seq: i64,
    pub last_recv_seq: i64,
    pub now_ms: u64,
}

/// Engine-owned session table, keyed primarily by connection id with a
/// secondary index by session id for hand-off lookups (§4.2 `RequestSession`).
#[derive(Debug, Default)]
pub struct GatewaySessions {
    by_connection: HashMap<ConnectionId, GatewaySession>,
    session_to_connection: HashMap<SessionId, ConnectionId>,
}

impl GatewaySessions {
    pub fn new() -> Self {
        GatewaySessions::default()
    }

    /// Inserts or updates a session record. Used on accept (`Connected`,
    /// heartbeat-interval 0), on `ReleaseSession` (`Active`), and on library
    /// timeout reclaim (`Active` or `Connected` depending on logon state).
    pub fn acquire(&mut self, params: AcquireParams) {
        if let Some(session_id) = params.session_id {
            self.session_to_connection
                .insert(session_id, params.connection_id);
        }
        let session = GatewaySession {
            connection_id: params.connection_id,
            session_key: params.session_key,
            session_id: params.session_id,
            state: params.state,
            heartbeat_interval_s: params.heartbeat_interval_s,
            last_heartbeat_recv_ms: params.now_ms,
            last_heartbeat_sent_ms: params.now_ms,
            last_sent_seq: params.last_sent_seq,
            last_recv_seq: params.last_recv_seq,
            reclaimed_from: None,
        };
        self.by_connection.insert(params.connection_id, session);
    }

    /// Every session currently reinstated by a timeout reclaim from
    /// `library_id`, as `(connection_id, session_id)` pairs ready to build
    /// `SessionInfo` entries for a `ControlNotification` (§4.2).
    pub fn reclaimed_sessions(&self, library_id: LibraryId) -> Vec<(ConnectionId, SessionId)> {
        self.by_connection
            .values()
            .filter(|s| s.reclaimed_from == Some(library_id))
            .filter_map(|s| s.session_id.map(|sid| (s.connection_id, sid)))
            .collect()
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&GatewaySession> {
        self.by_connection.get(&connection_id)
    }

    pub fn get_mut(&mut self, connection_id: ConnectionId) -> Option<&mut GatewaySession> {
        self.by_connection.get_mut(&connection_id)
    }

    pub fn get_by_session_id(&self, session_id: SessionId) -> Option<&GatewaySession> {
        self.session_to_connection
            .get(&session_id)
            .and_then(|conn_id| self.by_connection.get(conn_id))
    }

    /// Records that a heartbeat (or any message counted as one, per the
    /// session's FIX heartbeat-interval) was just received on `connection_id`.
    /// A no-op if the connection has no engine-owned session (§4.1(e)).
    pub fn touch_heartbeat_recv(&mut self, connection_id: ConnectionId, now_ms: u64) {
        if let Some(session) = self.by_connection.get_mut(&connection_id) {
            session.last_heartbeat_recv_ms = now_ms;
        }
    }

    /// Every engine-owned session whose heartbeat interval is set and whose
    /// last received heartbeat is older than `missed_intervals ×` its own
    /// heartbeat interval (§4.1(e), §9).
    pub fn heartbeat_timed_out(&self, now_ms: u64, missed_intervals: u64) -> Vec<ConnectionId> {
        self.by_connection
            .values()
            .filter(|s| s.heartbeat_interval_s > 0)
            .filter(|s| {
                let timeout_ms = u64::from(s.heartbeat_interval_s) * 1000 * missed_intervals;
                now_ms.saturating_sub(s.last_heartbeat_recv_ms) > timeout_ms
            })
            .map(|s| s.connection_id)
            .collect()
    }

    /// Removes and returns the session owning `session_id`, if it is present
    /// and currently `Active` (§4.2 `RequestSession` hand-off precondition).
    pub fn remove_if_active(&mut self, session_id: SessionId) -> Option<GatewaySession> {
        let connection_id = *self.session_to_connection.get(&session_id)?;
        let is_active = self
            .by_connection
            .get(&connection_id)
            .is_some_and(|s| s.state == SessionState::Active);
        if !is_active {
            return None;
        }
        self.session_to_connection.remove(&session_id);
        self.by_connection.remove(&connection_id)
    }

    pub fn remove_by_connection(&mut self, connection_id: ConnectionId) -> Option<GatewaySession> {
        let removed = self.by_connection.remove(&connection_id)?;
        if let Some(session_id) = removed.session_id {
            self.session_to_connection.remove(&session_id);
        }
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.by_connection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_connection.is_empty()
    }

    /// Every composite key currently held by a session in this table, for
    /// releasing them from the identity store on shutdown (§5 `on_close`).
    pub fn all_session_keys(&self) -> Vec<CompositeKey> {
        self.by_connection
            .values()
            .filter_map(|s| s.session_key.clone())
            .collect()
    }

    /// Drops every entry. Used by `on_close()` (§5), which must be idempotent
    /// — calling this on an already-empty table is a no-op.
    pub fn clear(&mut self) {
        self.by_connection.clear();
        self.session_to_connection.clear();
    }
}
