//! The Framer: owns every live TCP connection, arbitrates ownership of
//! sessions between the engine and libraries, and drives the
//! authentication/hand-off state machine on one thread with no locking
//! (§1, §2.8, §5).

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};

use gw_protocol::commands::{
    Disconnect, InitiateConnection, LibraryCommand, LibraryConnect, ReleaseSession,
    RequestSession, SequenceNumberType,
};
use gw_protocol::constants::{ENGINE_LIBRARY_ID, NO_MESSAGE_REPLAY};
use gw_protocol::publication::{
    LogonRecord, LogonStatus, ManageConnectionRecord, ManagedSessionState, Position,
    PublicationBus, ReplyStatus, SessionInfo,
};
use gw_protocol::{
    Clock, CompositeKey, ConnectionDirection, ConnectionId, DispatchResult, GatewayError,
    GatewayErrorKind, LeadershipQuery, LibraryId, SessionIdentityStore,
};

use crate::connector::{self, ConnectPoll};
use crate::endpoint::{EndpointFactory, ReceiverEndpoint, SenderEndpoint};
use crate::errors::{ErrorHandler, FramerError};
use crate::gateway_sessions::{AcquireParams, GatewaySessions, SessionState};
use crate::library_registry::LibraryRegistry;
use crate::reply_state::{InitiateReplyState, ReplyStateTable, RetryStage};

/// Bound on how many inbound commands are drained per tick, keeping step (a)
/// finite so one busy library cannot starve the rest of the tick (§4.1).
const MAX_COMMANDS_PER_TICK: usize = 64;

/// An engine-owned session is considered to have missed its heartbeat once
/// this many of its own heartbeat intervals have elapsed without an
/// inbound heartbeat (§4.1(e)). §9's open question concerns re-arming the
/// schedule after a library-timeout reclaim, which `check_heartbeats`
/// already does by stamping `now_ms`; this constant is the separate policy
/// decision for ongoing session-heartbeat checking, which the distilled
/// spec left undefined.
const SESSION_HEARTBEAT_MISSED_INTERVALS: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    Engine,
    Library(LibraryId),
}

/// Metadata about a live connection, independent of which registry currently
/// tracks its session-level state.
#[derive(Debug, Clone)]
struct ConnectionEntry {
    direction: ConnectionDirection,
    owner: Ownership,
    address: String,
}

/// Everything about a connection a library currently owns that the engine
/// needs again if the library times out (§4.4).
#[derive(Debug, Clone)]
struct LibraryOwnedConnection {
    session_id: gw_protocol::SessionId,
    session_key: Option<CompositeKey>,
    direction: ConnectionDirection,
    logon_completed: bool,
    heartbeat_interval_s: u32,
    last_sent_seq: i64,
    last_recv_seq: i64,
    username: Option<String>,
    password: Option<String>,
}

/// The Framer core. Generic over its five external collaborators so
/// production wiring and tests share one implementation (§6).
pub struct Framer<B, I, L, C, E, H>
where
    B: PublicationBus,
    I: SessionIdentityStore,
    L: LeadershipQuery,
    C: Clock,
    E: EndpointFactory,
    H: ErrorHandler,
{
    listener: TcpListener,
    bus: B,
    identity_store: I,
    leadership: L,
    clock: C,
    endpoint_factory: E,
    error_handler: H,
    reply_timeout_ms: u64,

    next_connection_id: u64,
    connections: HashMap<ConnectionId, ConnectionEntry>,
    receivers: HashMap<ConnectionId, ReceiverEndpoint>,
    senders: HashMap<ConnectionId, SenderEndpoint>,

    library_registry: LibraryRegistry,
    gateway_sessions: GatewaySessions,
    library_owned: HashMap<ConnectionId, LibraryOwnedConnection>,

    reply_states: ReplyStateTable,
    connecting_sockets: HashMap<gw_protocol::CorrelationId, socket2::Socket>,
    pending_library_timeouts: Vec<LibraryId>,

    inbound: std::collections::VecDeque<LibraryCommand>,
    closed: bool,
}

impl<B, I, L, C, E, H> Framer<B, I, L, C, E, H>
where
    B: PublicationBus,
    I: SessionIdentityStore,
    L: LeadershipQuery,
    C: Clock,
    E: EndpointFactory,
    H: ErrorHandler,
{
    pub fn new(
        listener: TcpListener,
        bus: B,
        identity_store: I,
        leadership: L,
        clock: C,
        endpoint_factory: E,
        error_handler: H,
        reply_timeout_ms: u64,
    ) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(Framer {
            listener,
            bus,
            identity_store,
            leadership,
            clock,
            endpoint_factory,
            error_handler,
            reply_timeout_ms,
            next_connection_id: 1,
            connections: HashMap::new(),
            receivers: HashMap::new(),
            senders: HashMap::new(),
            library_registry: LibraryRegistry::new(),
            gateway_sessions: GatewaySessions::new(),
            library_owned: HashMap::new(),
            reply_states: ReplyStateTable::new(),
            connecting_sockets: HashMap::new(),
            pending_library_timeouts: Vec::new(),
            inbound: std::collections::VecDeque::new(),
            closed: false,
        })
    }

    /// Enqueues a command for the next `do_work()` call. Stands in for a
    /// real Subscription's `poll()` (§4.2); production wiring replaces this
    /// with whatever drains the actual command channel.
    pub fn offer_command(&mut self, command: LibraryCommand) {
        self.inbound.push_back(command);
    }

    pub fn gateway_sessions(&self) -> &GatewaySessions {
        &self.gateway_sessions
    }

    pub fn library_registry(&self) -> &LibraryRegistry {
        &self.library_registry
    }

    /// Read-only access to the publication bus, mainly so tests can inspect
    /// what a [`PublicationBus`] double recorded.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Whether `connection_id` is still tracked by the Framer (has live
    /// endpoints and a connection-table entry). Used by tests to observe the
    /// effect of a disconnect without reaching into private state.
    pub fn has_connection(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    fn allocate_connection_id(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;
        id
    }

    /// One cooperative tick, executing the fixed step order from §4.1.
    pub fn do_work(&mut self) {
        self.drain_commands();
        self.poll_accept();
        self.poll_receivers();
        self.poll_senders();
        self.check_heartbeats();
        self.retry_back_pressured();
    }

    // -- (a) command dispatch -------------------------------------------

    fn drain_commands(&mut self) {
        for _ in 0..MAX_COMMANDS_PER_TICK {
            let Some(command) = self.inbound.front() else {
                break;
            };
            let command = command.clone();
            match self.dispatch(command) {
                DispatchResult::Continue => {
                    self.inbound.pop_front();
                }
                DispatchResult::Abort | DispatchResult::Break => break,
            }
        }
    }

    fn dispatch(&mut self, command: LibraryCommand) -> DispatchResult {
        match command {
            LibraryCommand::LibraryConnect(cmd) => self.handle_library_connect(cmd),
            LibraryCommand::InitiateConnection(cmd) => self.handle_initiate_connection(cmd),
            LibraryCommand::ReleaseSession(cmd) => self.handle_release_session(cmd),
            LibraryCommand::RequestSession(cmd) => self.handle_request_session(cmd),
            LibraryCommand::Disconnect(cmd) => self.handle_disconnect(cmd),
        }
    }

    fn handle_library_connect(&mut self, cmd: LibraryConnect) -> DispatchResult {
        let now = self.clock.now_ms();
        let is_new = self
            .library_registry
            .connect(cmd.library_id, cmd.aeron_session_id, now);

        if is_new {
            if self
                .bus
                .save_application_heartbeat(cmd.library_id)
                .is_back_pressured()
            {
                return DispatchResult::Abort;
            }
            let reclaimed = self.sessions_reclaimed_from(cmd.library_id);
            if !reclaimed.is_empty()
                && self
                    .bus
                    .save_control_notification(cmd.library_id, reclaimed)
                    .is_back_pressured()
            {
                return DispatchResult::Abort;
            }
        } else {
            let handed_off = self.sessions_owned_by(cmd.library_id);
            if self
                .bus
                .save_control_notification(cmd.library_id, handed_off)
                .is_back_pressured()
            {
                return DispatchResult::Abort;
            }
        }
        DispatchResult::Continue
    }

    fn sessions_reclaimed_from(&self, library_id: LibraryId) -> Vec<SessionInfo> {
        self.gateway_sessions
            .reclaimed_sessions(library_id)
            .into_iter()
            .map(|(connection_id, session_id)| SessionInfo {
                connection_id,
                session_id,
            })
            .collect()
    }

    fn sessions_owned_by(&self, library_id: LibraryId) -> Vec<SessionInfo> {
        self.library_registry
            .owned_connections(library_id)
            .into_iter()
            .filter_map(|connection_id| {
                self.library_owned
                    .get(&connection_id)
                    .map(|owned| SessionInfo {
                        connection_id,
                        session_id: owned.session_id,
                    })
            })
            .collect()
    }

    fn handle_initiate_connection(&mut self, cmd: InitiateConnection) -> DispatchResult {
        if !self.library_registry.is_known(cmd.library_id) {
            let err = GatewayError::new(
                GatewayErrorKind::UnknownLibrary,
                cmd.library_id,
                Some(cmd.correlation_id.0),
                "library is not registered",
            );
            return if self.bus.save_error(err).is_back_pressured() {
                DispatchResult::Abort
            } else {
                DispatchResult::Continue
            };
        }

        let existing_stage = self.reply_states.get(cmd.correlation_id).map(|s| s.stage);
        match existing_stage {
            None => self.start_initiate(cmd),
            Some(RetryStage::Connecting) => self.resume_connecting(cmd.correlation_id),
            Some(RetryStage::SaveError) => self.resume_error(cmd.correlation_id),
            Some(_) => self.resume_publishing(cmd.correlation_id),
        }
    }

    /// Publishes a terminal error for a fresh `InitiateConnection` that has
    /// no reply-state yet (invalid address, synchronous connect failure). On
    /// back-pressure, stores a minimal `SaveError` state so the next
    /// delivery of the same correlation id retries only the publish (§4.5).
    fn fail_new_initiate(
        &mut self,
        cmd: &InitiateConnection,
        address: String,
        kind: GatewayErrorKind,
        message: String,
    ) -> DispatchResult {
        let err = GatewayError::new(kind, cmd.library_id, Some(cmd.correlation_id.0), message.clone());
        if self.bus.save_error(err).is_back_pressured() {
            self.reply_states.insert(InitiateReplyState {
                correlation_id: cmd.correlation_id,
                library_id: cmd.library_id,
                connection_id: None,
                session_id: None,
                address,
                sender_comp_id: cmd.sender_comp_id.clone(),
                sender_sub_id: cmd.sender_sub_id.clone(),
                sender_location_id: cmd.sender_location_id.clone(),
                target_comp_id: cmd.target_comp_id.clone(),
                username: cmd.username.clone(),
                password: cmd.password.clone(),
                heartbeat_interval_s: cmd.heartbeat_interval_s,
                initial_seq_num: 0,
                stage: RetryStage::SaveError,
                error: Some((kind, message)),
            });
            return DispatchResult::Abort;
        }
        DispatchResult::Continue
    }

    /// Publishes a terminal error for an `InitiateConnection` that already
    /// has a reply-state in flight (post-connect duplicate session, etc.).
    /// On back-pressure, re-stores `state` with `SaveError` so retry skips
    /// straight to re-publishing (§4.5).
    fn fail_initiate(
        &mut self,
        mut state: InitiateReplyState,
        kind: GatewayErrorKind,
        message: String,
    ) -> DispatchResult {
        let err = GatewayError::new(kind, state.library_id, Some(state.correlation_id.0), message.clone());
        if self.bus.save_error(err).is_back_pressured() {
            state.stage = RetryStage::SaveError;
            state.error = Some((kind, message));
            self.reply_states.insert(state);
            return DispatchResult::Abort;
        }
        DispatchResult::Continue
    }

    fn resume_error(&mut self, correlation_id: gw_protocol::CorrelationId) -> DispatchResult {
        let Some(state) = self.reply_states.remove(correlation_id) else {
            return DispatchResult::Continue;
        };
        let Some((kind, message)) = state.error.clone() else {
            return DispatchResult::Continue;
        };
        self.fail_initiate(state, kind, message)
    }

    fn start_initiate(&mut self, cmd: InitiateConnection) -> DispatchResult {
        let address: SocketAddr = match format!("{}:{}", cmd.host, cmd.port).parse() {
            Ok(addr) => addr,
            Err(_) => {
                let address = format!("{}:{}", cmd.host, cmd.port);
                return self.fail_new_initiate(
                    &cmd,
                    address.clone(),
                    GatewayErrorKind::UnableToConnect,
                    format!("invalid address {address}"),
                );
            }
        };

        let socket = match connector::start_connect(address) {
            Ok(socket) => socket,
            Err(_) => {
                return self.fail_new_initiate(
                    &cmd,
                    address.to_string(),
                    GatewayErrorKind::UnableToConnect,
                    format!("connect to {address} failed"),
                );
            }
        };

        self.connecting_sockets.insert(cmd.correlation_id, socket);
        self.reply_states.insert(InitiateReplyState {
            correlation_id: cmd.correlation_id,
            library_id: cmd.library_id,
            connection_id: None,
            session_id: None,
            address: address.to_string(),
            sender_comp_id: cmd.sender_comp_id,
            sender_sub_id: cmd.sender_sub_id,
            sender_location_id: cmd.sender_location_id,
            target_comp_id: cmd.target_comp_id,
            username: cmd.username,
            password: cmd.password,
            heartbeat_interval_s: cmd.heartbeat_interval_s,
            initial_seq_num: match cmd.sequence_number_type {
                SequenceNumberType::Automatic => {
                    gw_protocol::constants::AUTOMATIC_INITIAL_SEQUENCE_NUMBER
                }
                SequenceNumberType::Explicit(n) => n,
            },
            stage: RetryStage::Connecting,
            error: None,
        });
        DispatchResult::Abort
    }

    fn resume_connecting(&mut self, correlation_id: gw_protocol::CorrelationId) -> DispatchResult {
        let Some(socket) = self.connecting_sockets.get(&correlation_id) else {
            return DispatchResult::Continue;
        };
        match connector::poll_connect(socket) {
            ConnectPoll::Pending => DispatchResult::Abort,
            ConnectPoll::Failed(_) => {
                self.connecting_sockets.remove(&correlation_id);
                let Some(state) = self.reply_states.remove(correlation_id) else {
                    return DispatchResult::Continue;
                };
                let message = format!("connect to {} failed", state.address);
                self.fail_initiate(state, GatewayErrorKind::UnableToConnect, message)
            }
            ConnectPoll::Connected(stream) => {
                self.connecting_sockets.remove(&correlation_id);
                self.complete_connect(correlation_id, stream)
            }
        }
    }

    fn complete_connect(
        &mut self,
        correlation_id: gw_protocol::CorrelationId,
        stream: std::net::TcpStream,
    ) -> DispatchResult {
        let Some(mut state) = self.reply_states.remove(correlation_id) else {
            return DispatchResult::Continue;
        };

        let key = CompositeKey::new(
            state.sender_comp_id.clone(),
            state.target_comp_id.clone(),
            None,
        );
        match self.identity_store.on_logon(&key) {
            gw_protocol::LogonOutcome::DuplicateSession => self.fail_initiate(
                state,
                GatewayErrorKind::DuplicateSession,
                "session identity store reports a live duplicate".to_owned(),
            ),
            gw_protocol::LogonOutcome::Missing => self.fail_initiate(
                state,
                GatewayErrorKind::UnableToConnect,
                "session identity store has no session id available".to_owned(),
            ),
            gw_protocol::LogonOutcome::Assigned(session_id) => {
                let connection_id = self.allocate_connection_id();
                state.connection_id = Some(connection_id);
                state.session_id = Some(session_id);

                let (receiver, sender) = match self.endpoint_factory.make_endpoints(
                    stream,
                    connection_id,
                    state.library_id,
                ) {
                    Ok(pair) => pair,
                    Err(_) => {
                        return self.fail_initiate(
                            state,
                            GatewayErrorKind::UnableToConnect,
                            "failed constructing endpoints".to_owned(),
                        );
                    }
                };
                self.receivers.insert(connection_id, receiver);
                self.senders.insert(connection_id, sender);
                self.connections.insert(
                    connection_id,
                    ConnectionEntry {
                        direction: ConnectionDirection::Initiator,
                        owner: Ownership::Library(state.library_id),
                        address: state.address.clone(),
                    },
                );

                state.stage = RetryStage::SaveManageConnection;
                self.reply_states.insert(state);
                self.resume_publishing(correlation_id)
            }
        }
    }

    fn resume_publishing(&mut self, correlation_id: gw_protocol::CorrelationId) -> DispatchResult {
        let Some(state) = self.reply_states.get(correlation_id) else {
            return DispatchResult::Continue;
        };
        let (connection_id, session_id) = match (state.connection_id, state.session_id) {
            (Some(c), Some(s)) => (c, s),
            _ => return DispatchResult::Continue,
        };

        // `AUTOMATIC_INITIAL_SEQUENCE_NUMBER` means "start fresh"; anything
        // else is the explicit outbound sequence number the library asked
        // for (§4.2 `InitiateConnection`, §6 constants).
        let initial_sent_seq =
            if state.initial_seq_num == gw_protocol::constants::AUTOMATIC_INITIAL_SEQUENCE_NUMBER {
                0
            } else {
                state.initial_seq_num
            };

        if state.stage == RetryStage::SaveManageConnection {
            let record = ManageConnectionRecord {
                connection_id,
                session_id,
                address: state.address.clone(),
                library_id: state.library_id,
                direction: ConnectionDirection::Initiator,
                last_sent_seq: initial_sent_seq,
                last_recv_seq: 0,
                state: ManagedSessionState::Active,
                heartbeat_interval_s: state.heartbeat_interval_s,
            };
            if self.bus.save_manage_connection(record).is_back_pressured() {
                return DispatchResult::Abort;
            }
            self.reply_states
                .set_stage(correlation_id, RetryStage::SaveLogon);
        }

        let Some(state) = self.reply_states.get(correlation_id) else {
            return DispatchResult::Continue;
        };
        let logon = LogonRecord {
            library_id: state.library_id,
            connection_id,
            session_id,
            sent_seq_num: initial_sent_seq,
            recv_seq_num: 0,
            sender_comp_id: state.sender_comp_id.clone(),
            sender_sub_id: state.sender_sub_id.clone(),
            sender_location_id: state.sender_location_id.clone(),
            target_comp_id: state.target_comp_id.clone(),
            username: state.username.clone(),
            password: state.password.clone(),
            status: LogonStatus::New,
        };
        if self.bus.save_logon(logon).is_back_pressured() {
            return DispatchResult::Abort;
        }

        let Some(state) = self.reply_states.remove(correlation_id) else {
            return DispatchResult::Continue;
        };
        self.library_registry
            .assign_connection(state.library_id, connection_id);
        self.library_owned.insert(
            connection_id,
            LibraryOwnedConnection {
                session_id,
                session_key: Some(CompositeKey::new(
                    state.sender_comp_id.clone(),
                    state.target_comp_id.clone(),
                    None,
                )),
                direction: ConnectionDirection::Initiator,
                logon_completed: true,
                heartbeat_interval_s: state.heartbeat_interval_s,
                last_sent_seq: initial_sent_seq,
                last_recv_seq: 0,
                username: state.username,
                password: state.password,
            },
        );
        DispatchResult::Continue
    }

    fn handle_release_session(&mut self, cmd: ReleaseSession) -> DispatchResult {
        let owned = self.library_owned.remove(&cmd.connection_id);
        self.library_registry
            .unassign_connection(cmd.library_id, cmd.connection_id);

        // §4.2, §8: a released session is unconditionally re-registered as
        // `ACTIVE` regardless of the `session_state` the library reports —
        // the library is handing a live, authenticated session back, never
        // an in-progress one.
        let now = self.clock.now_ms();
        self.gateway_sessions.acquire(AcquireParams {
            connection_id: cmd.connection_id,
            session_key: owned.as_ref().and_then(|o| o.session_key.clone()),
            session_id: owned.map(|o| o.session_id),
            state: SessionState::Active,
            heartbeat_interval_s: cmd.heartbeat_interval_s,
            last_sent_seq: cmd.last_sent_seq,
            last_recv_seq: cmd.last_recv_seq,
            now_ms: now,
        });
        if let Some(entry) = self.connections.get_mut(&cmd.connection_id) {
            entry.owner = Ownership::Engine;
        }

        if self
            .bus
            .save_release_session_reply(ReplyStatus::Ok, cmd.correlation_id.0)
            .is_back_pressured()
        {
            return DispatchResult::Abort;
        }
        DispatchResult::Continue
    }

    fn handle_request_session(&mut self, cmd: RequestSession) -> DispatchResult {
        let Some(session) = self.gateway_sessions.remove_if_active(cmd.session_id) else {
            return DispatchResult::Continue;
        };

        self.library_registry
            .assign_connection(cmd.library_id, session.connection_id);
        if let Some(entry) = self.connections.get_mut(&session.connection_id) {
            entry.owner = Ownership::Library(cmd.library_id);
        }
        self.library_owned.insert(
            session.connection_id,
            LibraryOwnedConnection {
                session_id: cmd.session_id,
                session_key: session.session_key,
                direction: self
                    .connections
                    .get(&session.connection_id)
                    .map(|e| e.direction)
                    .unwrap_or(ConnectionDirection::Acceptor),
                logon_completed: true,
                heartbeat_interval_s: session.heartbeat_interval_s,
                last_sent_seq: session.last_sent_seq,
                last_recv_seq: session.last_recv_seq,
                username: None,
                password: None,
            },
        );

        // §4.2: a replay request (anything other than NO_MESSAGE_REPLAY) is
        // handled by the Replay Query collaborator, out of scope here.
        let _wants_replay = cmd.last_received_seq != NO_MESSAGE_REPLAY;

        if self
            .bus
            .save_request_session_reply(ReplyStatus::Ok, cmd.correlation_id.0)
            .is_back_pressured()
        {
            return DispatchResult::Abort;
        }
        DispatchResult::Continue
    }

    fn handle_disconnect(&mut self, cmd: Disconnect) -> DispatchResult {
        if let Some(receiver) = self.receivers.get_mut(&cmd.connection_id) {
            receiver.close(cmd.reason);
        }
        if let Some(sender) = self.senders.get_mut(&cmd.connection_id) {
            sender.close();
        }
        self.library_registry
            .unassign_connection(cmd.library_id, cmd.connection_id);
        let owned = self.library_owned.remove(&cmd.connection_id);
        let gateway_session = self.gateway_sessions.remove_by_connection(cmd.connection_id);
        let session_key = owned
            .and_then(|o| o.session_key)
            .or_else(|| gateway_session.and_then(|s| s.session_key));
        if let Some(key) = session_key {
            self.identity_store.release(&key);
        }
        self.connections.remove(&cmd.connection_id);
        self.receivers.remove(&cmd.connection_id);
        self.senders.remove(&cmd.connection_id);
        DispatchResult::Continue
    }

    // -- (b) accept path --------------------------------------------------

    fn poll_accept(&mut self) {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                if !self.leadership.is_leader() {
                    let _ = stream.shutdown(std::net::Shutdown::Both);
                    self.error_handler.on_error(FramerError::NotLeaderOnAccept {
                        remote_addr: addr.to_string(),
                    });
                    return;
                }
                let connection_id = self.allocate_connection_id();
                match self
                    .endpoint_factory
                    .make_endpoints(stream, connection_id, ENGINE_LIBRARY_ID)
                {
                    Ok((receiver, sender)) => {
                        self.receivers.insert(connection_id, receiver);
                        self.senders.insert(connection_id, sender);
                        self.connections.insert(
                            connection_id,
                            ConnectionEntry {
                                direction: ConnectionDirection::Acceptor,
                                owner: Ownership::Engine,
                                address: addr.to_string(),
                            },
                        );
                        let now = self.clock.now_ms();
                        self.gateway_sessions.acquire(AcquireParams {
                            connection_id,
                            session_key: None,
                            session_id: None,
                            state: SessionState::Connected,
                            heartbeat_interval_s: 0,
                            last_sent_seq: 0,
                            last_recv_seq: 0,
                            now_ms: now,
                        });
                    }
                    Err(source) => {
                        self.error_handler
                            .on_error(FramerError::ChannelError { connection_id, source });
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(_) => {}
        }
    }

    // -- (c) receiver poll -------------------------------------------------

    fn poll_receivers(&mut self) {
        let ids: Vec<ConnectionId> = self.receivers.keys().copied().collect();
        for connection_id in ids {
            let Some(receiver) = self.receivers.get_mut(&connection_id) else {
                continue;
            };
            let (frames, eof) = match receiver.poll() {
                Ok(result) => result,
                Err(_) => {
                    self.on_channel_error(connection_id);
                    continue;
                }
            };
            for frame in frames {
                if frame.is_logon() {
                    self.handle_inbound_logon(connection_id, &frame);
                } else if frame.is_heartbeat() {
                    let now = self.clock.now_ms();
                    self.gateway_sessions.touch_heartbeat_recv(connection_id, now);
                }
            }
            if eof {
                self.on_remote_disconnect(connection_id);
            }
        }
    }

    fn handle_inbound_logon(&mut self, connection_id: ConnectionId, frame: &crate::endpoint::FixFrame) {
        let Some(session) = self.gateway_sessions.get(connection_id) else {
            return;
        };
        if session.state != SessionState::Connected && session.state != SessionState::Connecting {
            return;
        }
        let sender_comp_id = find_tag(&frame.0, b"49=").unwrap_or_default();
        let target_comp_id = find_tag(&frame.0, b"56=").unwrap_or_default();
        let heartbeat_interval_s: u32 = find_tag(&frame.0, b"108=")
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);
        let key = CompositeKey::new(sender_comp_id, target_comp_id, None);

        match self.identity_store.on_logon(&key) {
            gw_protocol::LogonOutcome::Assigned(session_id) => {
                let now = self.clock.now_ms();
                self.gateway_sessions.acquire(AcquireParams {
                    connection_id,
                    session_key: Some(key),
                    session_id: Some(session_id),
                    state: SessionState::Active,
                    heartbeat_interval_s,
                    last_sent_seq: 0,
                    last_recv_seq: 0,
                    now_ms: now,
                });
            }
            gw_protocol::LogonOutcome::DuplicateSession | gw_protocol::LogonOutcome::Missing => {
                if let Some(receiver) = self.receivers.get_mut(&connection_id) {
                    receiver.close(gw_protocol::DisconnectReason::FailedAuthentication);
                }
                if let Some(sender) = self.senders.get_mut(&connection_id) {
                    sender.close();
                }
                self.gateway_sessions.remove_by_connection(connection_id);
            }
        }
    }

    fn on_remote_disconnect(&mut self, connection_id: ConnectionId) {
        if let Some(receiver) = self.receivers.get_mut(&connection_id) {
            receiver.close(gw_protocol::DisconnectReason::RemoteDisconnect);
        }
        if let Some(sender) = self.senders.get_mut(&connection_id) {
            sender.close();
        }
        let gateway_session = self.gateway_sessions.remove_by_connection(connection_id);
        let mut session_key = gateway_session.and_then(|s| s.session_key);
        if let Some(entry) = self.connections.remove(&connection_id) {
            if let Ownership::Library(library_id) = entry.owner {
                self.library_registry
                    .unassign_connection(library_id, connection_id);
                if let Some(owned) = self.library_owned.remove(&connection_id) {
                    session_key = session_key.or(owned.session_key);
                }
            }
        }
        if let Some(key) = session_key {
            self.identity_store.release(&key);
        }
        self.receivers.remove(&connection_id);
        self.senders.remove(&connection_id);
    }

    fn on_channel_error(&mut self, connection_id: ConnectionId) {
        self.error_handler.on_error(FramerError::ChannelError {
            connection_id,
            source: std::io::Error::new(std::io::ErrorKind::Other, "receiver channel error"),
        });
        self.on_remote_disconnect(connection_id);
    }

    // -- (d) sender poll ----------------------------------------------------

    fn poll_senders(&mut self) {
        let ids: Vec<ConnectionId> = self.senders.keys().copied().collect();
        for connection_id in ids {
            if let Some(sender) = self.senders.get_mut(&connection_id) {
                if sender.drain().is_err() {
                    self.on_channel_error(connection_id);
                }
            }
        }
    }

    // -- (e) heartbeat / timeout checks --------------------------------------

    fn check_heartbeats(&mut self) {
        let now = self.clock.now_ms();
        let timed_out = self.library_registry.timed_out(now, self.reply_timeout_ms);
        for library_id in timed_out {
            let Some(library) = self.library_registry.remove(library_id) else {
                continue;
            };
            for connection_id in library.owned_connections.iter().copied() {
                let owned = self.library_owned.remove(&connection_id);
                let direction = self
                    .connections
                    .get(&connection_id)
                    .map(|e| e.direction)
                    .unwrap_or(ConnectionDirection::Acceptor);
                let logon_completed = owned.as_ref().map(|o| o.logon_completed).unwrap_or(false);
                let state = match (direction, logon_completed) {
                    (ConnectionDirection::Acceptor, false) => SessionState::Connected,
                    _ => SessionState::Active,
                };
                if let Some(entry) = self.connections.get_mut(&connection_id) {
                    entry.owner = Ownership::Engine;
                }
                self.gateway_sessions.acquire(AcquireParams {
                    connection_id,
                    session_key: owned.as_ref().and_then(|o| o.session_key.clone()),
                    session_id: owned.as_ref().map(|o| o.session_id),
                    state,
                    heartbeat_interval_s: owned.as_ref().map(|o| o.heartbeat_interval_s).unwrap_or(0),
                    last_sent_seq: owned.as_ref().map(|o| o.last_sent_seq).unwrap_or(0),
                    last_recv_seq: owned.as_ref().map(|o| o.last_recv_seq).unwrap_or(0),
                    now_ms: now,
                });
                if let Some(session) = self.gateway_sessions.get_mut(connection_id) {
                    session.reclaimed_from = Some(library_id);
                }
            }
            if self.bus.save_library_timeout(library_id).is_back_pressured() {
                self.pending_library_timeouts.push(library_id);
            }
        }

        // Engine-owned sessions also carry their own heartbeat schedule
        // (§2.5, §3 `GatewaySession`) independent of which library, if any,
        // last owned the connection. A session missing its FIX heartbeat
        // deadline is disconnected the same way a channel error is (§9).
        let stale = self
            .gateway_sessions
            .heartbeat_timed_out(now, SESSION_HEARTBEAT_MISSED_INTERVALS);
        for connection_id in stale {
            if let Some(receiver) = self.receivers.get_mut(&connection_id) {
                receiver.close(gw_protocol::DisconnectReason::SessionHeartbeatTimeout);
            }
            if let Some(sender) = self.senders.get_mut(&connection_id) {
                sender.close();
            }
            if let Some(session) = self.gateway_sessions.remove_by_connection(connection_id) {
                if let Some(key) = session.session_key {
                    self.identity_store.release(&key);
                }
            }
            self.connections.remove(&connection_id);
            self.receivers.remove(&connection_id);
            self.senders.remove(&connection_id);
        }
    }

    // -- (f) retry back-pressured ambient publications -----------------------

    fn retry_back_pressured(&mut self) {
        let pending = std::mem::take(&mut self.pending_library_timeouts);
        for library_id in pending {
            if self.bus.save_library_timeout(library_id).is_back_pressured() {
                self.pending_library_timeouts.push(library_id);
            }
        }
    }

    /// Closes every endpoint and empties engine-owned state. Idempotent
    /// (§5): calling this twice in a row is a no-op the second time.
    pub fn on_close(&mut self) {
        if self.closed {
            return;
        }
        for sender in self.senders.values_mut() {
            sender.close();
        }
        for receiver in self.receivers.values_mut() {
            receiver.close(gw_protocol::DisconnectReason::EngineShutdown);
        }
        for session in self.gateway_sessions.all_session_keys() {
            self.identity_store.release(&session);
        }
        self.gateway_sessions.clear();
        self.library_registry.clear();
        self.library_owned.clear();
        self.connections.clear();
        self.closed = true;
    }
}

fn find_tag(body: &[u8], needle: &[u8]) -> Option<String> {
    let mut i = 0;
    while i + needle.len() <= body.len() {
        let at_start = i == 0 || body[i - 1] == 0x01;
        if at_start && &body[i..i + needle.len()] == needle {
            let value_start = i + needle.len();
            let value_end = body[value_start..]
                .iter()
                .position(|&b| b == 0x01)
                .map(|p| value_start + p)
                .unwrap_or(body.len());
            return Some(String::from_utf8_lossy(&body[value_start..value_end]).into_owned());
        }
        i += 1;
    }
    None
}

use std::io;
