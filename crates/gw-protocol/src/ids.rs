//! Identifiers shared between the Framer and anything that talks to it.
//!
//! Connection ids are monotonic and never reused (§3 invariant); library and
//! session ids are assigned by collaborators external to this crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a single TCP connection for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identifies a FIX session once logon has completed. Assignment is
/// monotonic except for the `DUPLICATE_SESSION` sentinel handled separately
/// by [`crate::identity::LogonOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Identifies a remote library process. `ENGINE_LIBRARY_ID` is reserved for
/// sessions currently owned by the engine itself (see [`crate::constants`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LibraryId(pub i32);

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "library-{}", self.0)
    }
}

/// Caller-supplied token echoed in replies so a library can match a request
/// to its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub u64);

/// The (sender-comp-id, target-comp-id, qualifier) triple identifying a FIX
/// session across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeKey {
    pub sender_comp_id: String,
    pub target_comp_id: String,
    /// Optional disambiguator when a single comp-id pair carries more than
    /// one logical session (e.g. multiple qualifiers per counterparty).
    pub qualifier: Option<String>,
}

impl CompositeKey {
    pub fn new(
        sender_comp_id: impl Into<String>,
        target_comp_id: impl Into<String>,
        qualifier: Option<String>,
    ) -> Self {
        CompositeKey {
            sender_comp_id: sender_comp_id.into(),
            target_comp_id: target_comp_id.into(),
            qualifier,
        }
    }
}

/// Direction a [`ConnectionId`] was established in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionDirection {
    /// Accepted on the Framer's listening socket.
    Acceptor,
    /// Established by the Framer on behalf of a library via `InitiateConnection`.
    Initiator,
}
