//! Black-box scenarios 3, 4 and 8 (spec §8): unknown-library rejection,
//! duplicate-session rejection on initiate, and a duplicate `LibraryConnect`
//! handing back whatever that library currently owns instead of
//! re-registering it.

use std::net::TcpListener;
use std::time::Duration;

use gateway::endpoint::TcpEndpointFactory;
use gateway::errors::TracingErrorHandler;
use gateway::framer::Framer;
use gw_protocol::commands::{InitiateConnection, LibraryConnect, LibraryCommand, SequenceNumberType};
use gw_protocol::{CompositeKey, CorrelationId, GatewayErrorKind, LibraryId};
use gw_test_support::{FakeClock, MockPublicationBus, MockSessionIdentityStore, Recorded, StaticLeadership};

type TestFramer = Framer<
    MockPublicationBus,
    MockSessionIdentityStore,
    StaticLeadership,
    FakeClock,
    TcpEndpointFactory,
    TracingErrorHandler,
>;

fn new_framer(listener: TcpListener, identity_store: MockSessionIdentityStore) -> TestFramer {
    Framer::new(
        listener,
        MockPublicationBus::new(),
        identity_store,
        StaticLeadership(true),
        FakeClock::new(0),
        TcpEndpointFactory,
        TracingErrorHandler,
        10_000,
    )
    .expect("framer construction")
}

fn bound_listener() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").unwrap()
}

fn initiate(library_id: LibraryId, correlation_id: u64, host: &str, port: u16) -> InitiateConnection {
    InitiateConnection {
        library_id,
        port,
        host: host.to_owned(),
        sender_comp_id: "SENDER".to_owned(),
        sender_sub_id: String::new(),
        sender_location_id: String::new(),
        target_comp_id: "TARGET".to_owned(),
        sequence_number_type: SequenceNumberType::Automatic,
        initial_seq_num: 0,
        username: None,
        password: None,
        heartbeat_interval_s: 30,
        correlation_id: CorrelationId(correlation_id),
    }
}

fn spin(framer: &mut TestFramer, max_ticks: usize, mut pred: impl FnMut(&TestFramer) -> bool) -> bool {
    for _ in 0..max_ticks {
        if pred(framer) {
            return true;
        }
        framer.do_work();
        std::thread::sleep(Duration::from_millis(1));
    }
    pred(framer)
}

#[test]
fn initiate_connection_from_unknown_library_is_rejected() {
    let listener = bound_listener();
    let mut framer = new_framer(listener, MockSessionIdentityStore::new());

    framer.offer_command(LibraryCommand::InitiateConnection(initiate(
        LibraryId(7),
        1,
        "127.0.0.1",
        9,
    )));
    framer.do_work();

    let calls = &framer.bus().calls;
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Recorded::Error(err) => {
            assert_eq!(err.kind, GatewayErrorKind::UnknownLibrary);
            assert_eq!(err.library_id, LibraryId(7));
            assert_eq!(err.reply_to_correlation_id, Some(1));
        }
        other => panic!("expected an Error record, got {other:?}"),
    }
}

#[test]
fn initiate_connection_with_duplicate_session_is_rejected() {
    // A live listener the connector can actually complete a handshake
    // against; the duplicate is detected after the TCP connect succeeds.
    let remote = bound_listener();
    let remote_addr = remote.local_addr().unwrap();
    std::thread::spawn(move || {
        for stream in remote.incoming().take(1) {
            drop(stream);
        }
    });

    let mut identity_store = MockSessionIdentityStore::new();
    identity_store.force_duplicate_for(CompositeKey::new("SENDER", "TARGET", None));

    let listener = bound_listener();
    let mut framer = new_framer(listener, identity_store);

    framer.offer_command(LibraryCommand::LibraryConnect(LibraryConnect {
        library_id: LibraryId(1),
        correlation_id: CorrelationId(0),
        aeron_session_id: 42,
    }));
    framer.do_work();

    framer.offer_command(LibraryCommand::InitiateConnection(initiate(
        LibraryId(1),
        2,
        &remote_addr.ip().to_string(),
        remote_addr.port(),
    )));

    let found = spin(&mut framer, 500, |f| {
        f.bus()
            .calls
            .iter()
            .any(|c| matches!(c, Recorded::Error(e) if e.kind == GatewayErrorKind::DuplicateSession))
    });
    assert!(found, "expected a DuplicateSession error to be published");
}

#[test]
fn reconnecting_library_is_handed_back_its_owned_sessions_instead_of_re_registered() {
    let remote = bound_listener();
    let remote_addr = remote.local_addr().unwrap();
    std::thread::spawn(move || {
        for stream in remote.incoming().take(1) {
            drop(stream);
        }
    });

    let listener = bound_listener();
    let mut framer = new_framer(listener, MockSessionIdentityStore::new());

    framer.offer_command(LibraryCommand::LibraryConnect(LibraryConnect {
        library_id: LibraryId(9),
        correlation_id: CorrelationId(0),
        aeron_session_id: 1,
    }));
    framer.do_work();
    assert!(framer.library_registry().is_known(LibraryId(9)));

    // Give library 9 ownership of one session via a real outbound connect,
    // so the next reconnect has something non-empty to hand back.
    framer.offer_command(LibraryCommand::InitiateConnection(initiate(
        LibraryId(9),
        1,
        &remote_addr.ip().to_string(),
        remote_addr.port(),
    )));
    let logged_on = spin(&mut framer, 500, |f| {
        f.bus().calls.iter().any(|c| matches!(c, Recorded::Logon(_)))
    });
    assert!(logged_on, "expected the outbound connect to complete and log on");
    let (connection_id, session_id) = framer
        .bus()
        .calls
        .iter()
        .find_map(|c| match c {
            Recorded::Logon(logon) => Some((logon.connection_id, logon.session_id)),
            _ => None,
        })
        .expect("a Logon record");

    // A second LibraryConnect for the same library id is a reconnect: it
    // must not be treated as a fresh registration, and must hand back
    // exactly the session just logged on.
    framer.offer_command(LibraryCommand::LibraryConnect(LibraryConnect {
        library_id: LibraryId(9),
        correlation_id: CorrelationId(2),
        aeron_session_id: 2,
    }));
    framer.do_work();

    let notification = framer.bus().calls.iter().rev().find_map(|c| match c {
        Recorded::ControlNotification { library_id, sessions } => Some((*library_id, sessions.clone())),
        _ => None,
    });
    let (library_id, sessions) = notification.expect("expected a ControlNotification record");
    assert_eq!(library_id, LibraryId(9));
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].connection_id, connection_id);
    assert_eq!(sessions[0].session_id, session_id);
}

#[test]
fn release_session_returns_ownership_to_the_engine_as_active() {
    use gateway::gateway_sessions::SessionState;
    use gw_protocol::commands::{GatewaySessionStateWire, ReleaseSession};
    use gw_protocol::publication::ReplyStatus;

    let remote = bound_listener();
    let remote_addr = remote.local_addr().unwrap();
    std::thread::spawn(move || {
        for stream in remote.incoming().take(1) {
            drop(stream);
        }
    });

    let listener = bound_listener();
    let mut framer = new_framer(listener, MockSessionIdentityStore::new());

    let library_id = LibraryId(4);
    framer.offer_command(LibraryCommand::LibraryConnect(LibraryConnect {
        library_id,
        correlation_id: CorrelationId(0),
        aeron_session_id: 1,
    }));
    framer.do_work();

    framer.offer_command(LibraryCommand::InitiateConnection(initiate(
        library_id,
        1,
        &remote_addr.ip().to_string(),
        remote_addr.port(),
    )));
    let logged_on = spin(&mut framer, 500, |f| {
        f.bus().calls.iter().any(|c| matches!(c, Recorded::Logon(_)))
    });
    assert!(logged_on, "expected the outbound connect to complete and log on");
    let connection_id = framer
        .bus()
        .calls
        .iter()
        .find_map(|c| match c {
            Recorded::Logon(logon) => Some(logon.connection_id),
            _ => None,
        })
        .expect("a Logon record");

    framer.offer_command(LibraryCommand::ReleaseSession(ReleaseSession {
        library_id,
        connection_id,
        correlation_id: CorrelationId(9),
        session_state: GatewaySessionStateWire::Active,
        heartbeat_interval_s: 30,
        last_sent_seq: 5,
        last_recv_seq: 7,
        username: None,
        password: None,
    }));
    framer.do_work();

    let session = framer
        .gateway_sessions()
        .get(connection_id)
        .expect("released session should be present in Gateway Sessions");
    assert_eq!(session.state, SessionState::Active);
    assert!(!framer.library_registry().owned_connections(library_id).contains(&connection_id));
    assert!(framer.bus().calls.iter().any(|c| matches!(
        c,
        Recorded::ReleaseSessionReply { status: ReplyStatus::Ok, correlation_id: 9 }
    )));
}
