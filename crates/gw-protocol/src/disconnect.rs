//! Reasons a connection can be torn down (§4.2, §7).

/// Passed to the Receiver Endpoint when a connection is closed. Not an
/// error: library timeout and explicit disconnect are observable lifecycle
/// signals, not failures (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Requested explicitly by a library via `Disconnect`.
    ApplicationDisconnect,
    /// The remote end closed the TCP channel.
    RemoteDisconnect,
    /// A TCP channel error occurred after the connection was established.
    ChannelError,
    /// The engine was not leader when the connection was accepted.
    NotLeader,
    /// Logon failed authentication.
    FailedAuthentication,
    /// An engine-owned session missed its FIX heartbeat deadline (§4.1(e)).
    SessionHeartbeatTimeout,
    /// `on_close()` tore the connection down as part of shutdown.
    EngineShutdown,
}
