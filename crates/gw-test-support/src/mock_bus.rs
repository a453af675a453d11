use gw_protocol::publication::{
    LogonRecord, ManageConnectionRecord, Position, PublicationBus, ReplyStatus, SessionInfo,
};
use gw_protocol::{GatewayError, LibraryId};

/// One recorded call, for assertions in tests that care about ordering and
/// exact payloads rather than just "did a call happen".
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    ManageConnection(ManageConnectionRecord),
    Logon(LogonRecord),
    Error(GatewayError),
    ReleaseSessionReply { status: ReplyStatus, correlation_id: u64 },
    RequestSessionReply { status: ReplyStatus, correlation_id: u64 },
    ApplicationHeartbeat(LibraryId),
    ControlNotification { library_id: LibraryId, sessions: Vec<SessionInfo> },
    LibraryTimeout(LibraryId),
}

impl PartialEq for ManageConnectionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.connection_id == other.connection_id
            && self.session_id == other.session_id
            && self.address == other.address
            && self.library_id == other.library_id
            && self.direction == other.direction
            && self.last_sent_seq == other.last_sent_seq
            && self.last_recv_seq == other.last_recv_seq
            && self.state == other.state
            && self.heartbeat_interval_s == other.heartbeat_interval_s
    }
}

impl PartialEq for LogonRecord {
    fn eq(&self, other: &Self) -> bool {
        self.library_id == other.library_id
            && self.connection_id == other.connection_id
            && self.session_id == other.session_id
            && self.sent_seq_num == other.sent_seq_num
            && self.recv_seq_num == other.recv_seq_num
            && self.sender_comp_id == other.sender_comp_id
            && self.sender_sub_id == other.sender_sub_id
            && self.sender_location_id == other.sender_location_id
            && self.target_comp_id == other.target_comp_id
            && self.username == other.username
            && self.password == other.password
            && self.status == other.status
    }
}

/// A [`PublicationBus`] double that records every call and can be scripted to
/// return [`Position::BackPressured`] a fixed number of times before
/// succeeding, exercising the retry path (§4.5) without a real transport.
#[derive(Debug, Default)]
pub struct MockPublicationBus {
    pub calls: Vec<Recorded>,
    next_position: i64,
    /// Number of remaining calls (to *any* method) that should report
    /// back-pressure before committing starts succeeding again.
    back_pressure_countdown: u32,
    /// Number of remaining `save_logon` calls specifically that should
    /// report back-pressure, independent of `back_pressure_countdown`. Lets
    /// tests exercise the `save_manage_connection` → `save_logon` resume
    /// without also back-pressuring the manage-connection stage (§4.5).
    logon_back_pressure_countdown: u32,
}

impl MockPublicationBus {
    pub fn new() -> Self {
        MockPublicationBus {
            calls: Vec::new(),
            next_position: 1,
            back_pressure_countdown: 0,
            logon_back_pressure_countdown: 0,
        }
    }

    /// The next `n` publish attempts (across any method) report
    /// [`Position::BackPressured`] instead of committing.
    pub fn back_pressure_next(&mut self, n: u32) {
        self.back_pressure_countdown = n;
    }

    /// The next `n` `save_logon` attempts specifically report
    /// [`Position::BackPressured`], leaving every other method unaffected.
    pub fn back_pressure_next_logon(&mut self, n: u32) {
        self.logon_back_pressure_countdown = n;
    }

    fn next(&mut self) -> Position {
        if self.back_pressure_countdown > 0 {
            self.back_pressure_countdown -= 1;
            return Position::BackPressured;
        }
        let pos = self.next_position;
        self.next_position += 1;
        Position::Committed(pos)
    }
}

impl PublicationBus for MockPublicationBus {
    fn save_manage_connection(&mut self, record: ManageConnectionRecord) -> Position {
        let pos = self.next();
        if !pos.is_back_pressured() {
            self.calls.push(Recorded::ManageConnection(record));
        }
        pos
    }

    fn save_logon(&mut self, record: LogonRecord) -> Position {
        if self.logon_back_pressure_countdown > 0 {
            self.logon_back_pressure_countdown -= 1;
            return Position::BackPressured;
        }
        let pos = self.next();
        if !pos.is_back_pressured() {
            self.calls.push(Recorded::Logon(record));
        }
        pos
    }

    fn save_error(&mut self, error: GatewayError) -> Position {
        let pos = self.next();
        if !pos.is_back_pressured() {
            self.calls.push(Recorded::Error(error));
        }
        pos
    }

    fn save_release_session_reply(&mut self, status: ReplyStatus, correlation_id: u64) -> Position {
        let pos = self.next();
        if !pos.is_back_pressured() {
            self.calls
                .push(Recorded::ReleaseSessionReply { status, correlation_id });
        }
        pos
    }

    fn save_request_session_reply(&mut self, status: ReplyStatus, correlation_id: u64) -> Position {
        let pos = self.next();
        if !pos.is_back_pressured() {
            self.calls
                .push(Recorded::RequestSessionReply { status, correlation_id });
        }
        pos
    }

    fn save_application_heartbeat(&mut self, library_id: LibraryId) -> Position {
        let pos = self.next();
        if !pos.is_back_pressured() {
            self.calls.push(Recorded::ApplicationHeartbeat(library_id));
        }
        pos
    }

    fn save_control_notification(
        &mut self,
        library_id: LibraryId,
        sessions: Vec<SessionInfo>,
    ) -> Position {
        let pos = self.next();
        if !pos.is_back_pressured() {
            self.calls
                .push(Recorded::ControlNotification { library_id, sessions });
        }
        pos
    }

    fn save_library_timeout(&mut self, library_id: LibraryId) -> Position {
        let pos = self.next();
        if !pos.is_back_pressured() {
            self.calls.push(Recorded::LibraryTimeout(library_id));
        }
        pos
    }
}
