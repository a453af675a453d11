//! Black-box scenarios 1 and 2 (spec §8): accepting a connection builds
//! exactly one Receiver/Sender pair owned by the engine, and an explicit
//! `Disconnect` command tears both down.

use std::cell::RefCell;
use std::io::{self, Write};
use std::net::{TcpListener, TcpStream};
use std::rc::Rc;
use std::time::Duration;

use gateway::endpoint::{EndpointFactory, ReceiverEndpoint, SenderEndpoint, TcpEndpointFactory};
use gateway::errors::TracingErrorHandler;
use gateway::framer::Framer;
use gateway::identity_store::InMemorySessionIdentityStore;
use gw_protocol::commands::{Disconnect, LibraryCommand};
use gw_protocol::constants::ENGINE_LIBRARY_ID;
use gw_protocol::{ConnectionId, DisconnectReason, LibraryId};
use gw_test_support::{FakeClock, MockPublicationBus, StaticLeadership};

/// Wraps the real TCP factory and records every `(connection_id, library_id)`
/// pair it was asked to build endpoints for, so tests can assert the engine
/// (not some library) owns a freshly accepted connection.
struct RecordingEndpointFactory {
    inner: TcpEndpointFactory,
    calls: Rc<RefCell<Vec<(ConnectionId, LibraryId)>>>,
}

impl EndpointFactory for RecordingEndpointFactory {
    fn make_endpoints(
        &self,
        channel: TcpStream,
        connection_id: ConnectionId,
        library_id: LibraryId,
    ) -> io::Result<(ReceiverEndpoint, SenderEndpoint)> {
        self.calls.borrow_mut().push((connection_id, library_id));
        self.inner.make_endpoints(channel, connection_id, library_id)
    }
}

type TestFramer = Framer<
    MockPublicationBus,
    InMemorySessionIdentityStore,
    StaticLeadership,
    FakeClock,
    RecordingEndpointFactory,
    TracingErrorHandler,
>;

fn new_framer(
    listener: TcpListener,
) -> (TestFramer, Rc<RefCell<Vec<(ConnectionId, LibraryId)>>>) {
    let calls: Rc<RefCell<Vec<(ConnectionId, LibraryId)>>> = Rc::default();
    let factory = RecordingEndpointFactory {
        inner: TcpEndpointFactory,
        calls: Rc::clone(&calls),
    };
    let framer = Framer::new(
        listener,
        MockPublicationBus::new(),
        InMemorySessionIdentityStore::new(),
        StaticLeadership(true),
        FakeClock::new(0),
        factory,
        TracingErrorHandler,
        10_000,
    )
    .expect("framer construction");
    (framer, calls)
}

/// Drives `do_work()` until `pred` is true or `max_ticks` is exhausted.
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
fn accept_builds_one_engine_owned_endpoint_pair() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (mut framer, calls) = new_framer(listener);

    let _client = TcpStream::connect(addr).expect("client connect");

    let accepted = spin(&mut framer, 200, |f| !f.gateway_sessions().is_empty());
    assert!(accepted, "expected the accept path to register a gateway session");

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, ENGINE_LIBRARY_ID, "freshly accepted connections are engine-owned");
}

#[test]
fn disconnect_command_closes_both_endpoints_and_forgets_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (mut framer, _calls) = new_framer(listener);

    let mut client = TcpStream::connect(addr).expect("client connect");
    let accepted = spin(&mut framer, 200, |f| !f.gateway_sessions().is_empty());
    assert!(accepted, "expected the accept path to register a gateway session");
    let _ = client.write_all(b"ping");

    // Connection ids are allocated from 1 starting at a fresh Framer, and
    // this test accepts exactly one connection.
    let cid = ConnectionId(1);
    assert!(framer.has_connection(cid), "connection should be tracked after accept");

    framer.offer_command(LibraryCommand::Disconnect(Disconnect {
        library_id: ENGINE_LIBRARY_ID,
        connection_id: cid,
        reason: DisconnectReason::ApplicationDisconnect,
    }));
    framer.do_work();

    assert!(!framer.has_connection(cid), "connection should be forgotten after disconnect");
}
