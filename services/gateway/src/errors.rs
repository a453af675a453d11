//! Hard failures reported via the Error Handler collaborator (§7).
//!
//! These never unwind across `do_work()`; every call site that can produce
//! one logs it and converts the situation into either a published protocol
//! error, a disconnect, or a no-op, per §7's propagation policy.

use gw_protocol::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum FramerError {
    #[error("accept rejected: node is not leader (remote {remote_addr})")]
    NotLeaderOnAccept { remote_addr: String },

    #[error("channel error on connection {connection_id}: {source}")]
    ChannelError {
        connection_id: ConnectionId,
        #[source]
        source: std::io::Error,
    },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

/// Sink for [`FramerError`]s. Production logs via `tracing`; tests can
/// substitute a recording implementation. No `Send` bound: the Framer owns
/// its collaborators on a single dedicated thread (§5).
pub trait ErrorHandler {
    fn on_error(&mut self, error: FramerError);
}

/// Logs every error at `error` level via `tracing`.
#[derive(Debug, Default)]
pub struct TracingErrorHandler;

impl ErrorHandler for TracingErrorHandler {
    fn on_error(&mut self, error: FramerError) {
        tracing::error!(%error, "framer error");
    }
}
