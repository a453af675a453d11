//! Black-box scenario 5 (spec §8, §4.5): a back-pressured `save_error`
//! publication is retried on the next delivery of the same
//! `InitiateConnection` command, and publishes exactly once once the bus
//! stops refusing writes.

use std::net::TcpListener;
use std::time::Duration;

use gateway::endpoint::TcpEndpointFactory;
use gateway::errors::TracingErrorHandler;
use gateway::framer::Framer;
use gw_protocol::commands::{InitiateConnection, LibraryConnect, LibraryCommand, SequenceNumberType};
use gw_protocol::{CorrelationId, GatewayErrorKind, LibraryId};
use gw_test_support::{FakeClock, MockPublicationBus, MockSessionIdentityStore, Recorded, StaticLeadership};

type TestFramer = Framer<
    MockPublicationBus,
    MockSessionIdentityStore,
    StaticLeadership,
    FakeClock,
    TcpEndpointFactory,
    TracingErrorHandler,
>;

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
fn back_pressured_error_publish_is_retried_until_it_commits_exactly_once() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut bus = MockPublicationBus::new();
    // Make the first two publish attempts back-pressured so the command
    // aborts and is redelivered twice before its `save_error` call commits.
    bus.back_pressure_next(2);
    let mut framer: TestFramer = Framer::new(
        listener,
        bus,
        MockSessionIdentityStore::new(),
        StaticLeadership(true),
        FakeClock::new(0),
        TcpEndpointFactory,
        TracingErrorHandler,
        10_000,
    )
    .expect("framer construction");

    let cmd = InitiateConnection {
        library_id: LibraryId(42),
        port: 9,
        host: "127.0.0.1".to_owned(),
        sender_comp_id: "SENDER".to_owned(),
        sender_sub_id: String::new(),
        sender_location_id: String::new(),
        target_comp_id: "TARGET".to_owned(),
        sequence_number_type: SequenceNumberType::Automatic,
        initial_seq_num: 0,
        username: None,
        password: None,
        heartbeat_interval_s: 30,
        correlation_id: CorrelationId(7),
    };

    // A back-pressured dispatch aborts the tick and leaves the command at
    // the front of the inbound queue, so the next `do_work()` naturally
    // retries the same command without re-offering it.
    framer.offer_command(LibraryCommand::InitiateConnection(cmd));
    framer.do_work();
    assert!(framer.bus().calls.is_empty(), "first attempt should have been back-pressured");

    framer.do_work();
    assert!(framer.bus().calls.is_empty(), "second attempt should have been back-pressured too");

    let published = spin(&mut framer, 10, |f| !f.bus().calls.is_empty());
    assert!(published, "third attempt should commit");
    assert_eq!(framer.bus().calls.len(), 1, "the error must publish exactly once");
    match &framer.bus().calls[0] {
        Recorded::Error(err) => {
            assert_eq!(err.kind, GatewayErrorKind::UnknownLibrary);
            assert_eq!(err.reply_to_correlation_id, Some(7));
        }
        other => panic!("expected an Error record, got {other:?}"),
    }
}

#[test]
fn back_pressured_logon_resumes_without_republishing_manage_connection() {
    // A live listener so the outbound connect in `InitiateConnection`
    // actually completes and reaches the `save_manage_connection` →
    // `save_logon` resume (§4.2, §4.5).
    let remote = TcpListener::bind("127.0.0.1:0").unwrap();
    let remote_addr = remote.local_addr().unwrap();
    std::thread::spawn(move || {
        for stream in remote.incoming().take(1) {
            drop(stream);
        }
    });

    let mut bus = MockPublicationBus::new();
    // Only the first `save_logon` attempt is back-pressured; every
    // `save_manage_connection` attempt is left alone, so a publish there
    // must commit on the first try.
    bus.back_pressure_next_logon(1);

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut framer: TestFramer = Framer::new(
        listener,
        bus,
        MockSessionIdentityStore::new(),
        StaticLeadership(true),
        FakeClock::new(0),
        TcpEndpointFactory,
        TracingErrorHandler,
        10_000,
    )
    .expect("framer construction");

    framer.offer_command(LibraryCommand::LibraryConnect(LibraryConnect {
        library_id: LibraryId(3),
        correlation_id: CorrelationId(0),
        aeron_session_id: 1,
    }));
    framer.do_work();

    let cmd = InitiateConnection {
        library_id: LibraryId(3),
        port: remote_addr.port(),
        host: remote_addr.ip().to_string(),
        sender_comp_id: "SENDER".to_owned(),
        sender_sub_id: String::new(),
        sender_location_id: String::new(),
        target_comp_id: "TARGET".to_owned(),
        sequence_number_type: SequenceNumberType::Automatic,
        initial_seq_num: 0,
        username: None,
        password: None,
        heartbeat_interval_s: 30,
        correlation_id: CorrelationId(11),
    };
    framer.offer_command(LibraryCommand::InitiateConnection(cmd));

    let logged_on = spin(&mut framer, 500, |f| {
        f.bus().calls.iter().any(|c| matches!(c, Recorded::Logon(_)))
    });
    assert!(logged_on, "expected the logon to eventually commit despite the back-pressure");

    let manage_connection_count = framer
        .bus()
        .calls
        .iter()
        .filter(|c| matches!(c, Recorded::ManageConnection(_)))
        .count();
    assert_eq!(
        manage_connection_count, 1,
        "manage-connection must not be republished while only the logon stage retries"
    );
    let logon_count = framer
        .bus()
        .calls
        .iter()
        .filter(|c| matches!(c, Recorded::Logon(_)))
        .count();
    assert_eq!(logon_count, 1, "the logon must commit exactly once");
}
