// gateway: process entry point.
//
// Loads config, initializes tracing, wires the concrete collaborators (TCP
// endpoint factory, in-memory session identity store, channel-backed
// publication bus, static leadership) into a `Framer`, and drives it with a
// bounded-backoff idle loop. `do_work()` never blocks, so the loop is the
// only place in the process allowed to sleep.

use std::net::TcpListener;
use std::time::Duration;

use gateway::channel_bus::channel_bus;
use gateway::config::{self, GatewayConfig};
use gateway::endpoint::TcpEndpointFactory;
use gateway::errors::TracingErrorHandler;
use gateway::framer::Framer;
use gateway::identity_store::InMemorySessionIdentityStore;
use gw_protocol::clock::SystemClock;
use gw_protocol::leader::StaticLeadership;
use tracing::info;

/// Bound on how many in-process publications queue up before a downstream
/// consumer must drain them; matches the default used by the channel bus's
/// own tests (`channel_bus::tests`).
const PUBLICATION_BUS_CAPACITY: usize = 1024;

/// Consecutive empty ticks before the idle loop starts backing off, and the
/// step/ceiling of the backoff itself. Mirrors the shape of an Aeron-style
/// `BackoffIdleStrategy` without pulling in the dependency: spin while busy,
/// then sleep in increasing steps once the Framer has nothing to do.
const SPIN_TICKS_BEFORE_BACKOFF: u32 = 1_000;
const MAX_BACKOFF: Duration = Duration::from_millis(1);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "gateway starting");

    let cfg: GatewayConfig = match config::load_config() {
        Ok(cfg) => {
            info!(
                bind_host = %cfg.network.bind_host,
                bind_port = cfg.network.bind_port,
                node_id = cfg.cluster.node_id,
                "config loaded"
            );
            cfg
        }
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind((cfg.network.bind_host.as_str(), cfg.network.bind_port)) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("FATAL: failed to bind {}:{}: {e}", cfg.network.bind_host, cfg.network.bind_port);
            std::process::exit(1);
        }
    };

    let (bus, _publications) = channel_bus(PUBLICATION_BUS_CAPACITY);
    let identity_store = InMemorySessionIdentityStore::new();
    // Consensus is out of scope (§1); a solo node is always its own leader.
    // A clustered deployment replaces this with a query into that layer.
    let leadership = StaticLeadership(true);
    let clock = SystemClock::new();
    let endpoint_factory = TcpEndpointFactory;
    let error_handler = TracingErrorHandler;

    let mut framer = match Framer::new(
        listener,
        bus,
        identity_store,
        leadership,
        clock,
        endpoint_factory,
        error_handler,
        cfg.timeouts.reply_timeout_ms,
    ) {
        Ok(framer) => framer,
        Err(e) => {
            eprintln!("FATAL: failed to initialize framer: {e}");
            std::process::exit(1);
        }
    };

    info!("framer initialized, entering event loop");
    let mut idle_ticks: u32 = 0;
    loop {
        framer.do_work();
        idle_ticks += 1;
        if idle_ticks > SPIN_TICKS_BEFORE_BACKOFF {
            std::thread::sleep(MAX_BACKOFF);
        }
    }
}
