//! In-flight reply bookkeeping for multi-publication command handlers
//! (§3 `ReplyState`, §4.5).
//!
//! `InitiateConnection` is the one handler with two sequential publications
//! (`ManageConnection` then `Logon`); everything needed to resume after a
//! `BACK_PRESSURED` on either is captured here so the dispatcher's re-delivery
//! can skip whatever already committed.

use std::collections::HashMap;

use gw_protocol::{ConnectionId, CorrelationId, GatewayErrorKind, LibraryId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStage {
    /// The non-blocking `connect()` has not completed yet; the connecting
    /// socket itself lives in the Framer's `connecting_sockets` table, keyed
    /// by the same correlation id, so this type stays plain data.
    Connecting,
    SaveManageConnection,
    SaveLogon,
    /// A terminal `save_error` publication was back-pressured; `error` holds
    /// what to re-publish. The one case with nothing left to retry once the
    /// publish lands (§4.5).
    SaveError,
}

#[derive(Debug)]
pub struct InitiateReplyState {
    pub correlation_id: CorrelationId,
    pub library_id: LibraryId,
    /// Allocated once the non-blocking connect completes.
    pub connection_id: Option<ConnectionId>,
    /// Allocated once the Session Identity Store has answered.
    pub session_id: Option<SessionId>,
    pub address: String,
    pub sender_comp_id: String,
    pub sender_sub_id: String,
    pub sender_location_id: String,
    pub target_comp_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub heartbeat_interval_s: u32,
    pub initial_seq_num: i64,
    pub stage: RetryStage,
    /// Set when `stage == SaveError`: the error re-published on the next
    /// delivery of this correlation id.
    pub error: Option<(GatewayErrorKind, String)>,
}

/// Table of in-flight `InitiateConnection` replies, keyed by correlation id
/// so the next delivery of the same command record finds its saved stage.
#[derive(Debug, Default)]
pub struct ReplyStateTable {
    in_flight: HashMap<CorrelationId, InitiateReplyState>,
}

impl ReplyStateTable {
    pub fn new() -> Self {
        ReplyStateTable::default()
    }

    pub fn get(&self, correlation_id: CorrelationId) -> Option<&InitiateReplyState> {
        self.in_flight.get(&correlation_id)
    }

    pub fn get_mut(&mut self, correlation_id: CorrelationId) -> Option<&mut InitiateReplyState> {
        self.in_flight.get_mut(&correlation_id)
    }

    pub fn insert(&mut self, state: InitiateReplyState) {
        self.in_flight.insert(state.correlation_id, state);
    }

    pub fn set_stage(&mut self, correlation_id: CorrelationId, stage: RetryStage) {
        if let Some(state) = self.in_flight.get_mut(&correlation_id) {
            state.stage = stage;
        }
    }

    pub fn remove(&mut self, correlation_id: CorrelationId) -> Option<InitiateReplyState> {
        self.in_flight.remove(&correlation_id)
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn clear(&mut self) {
        self.in_flight.clear();
    }
}
