//! Shared vocabulary between the Framer engine and its collaborators.
//!
//! Everything here is either a plain data type or a trait describing a seam
//! the engine talks across (clock, publication bus, identity store,
//! leadership query). Nothing in this crate depends on the engine itself, so
//! a mock/test-support crate can depend on `gw-protocol` alone without a
//! cycle back through the service that uses it.

pub mod clock;
pub mod commands;
pub mod constants;
pub mod disconnect;
pub mod dispatch;
pub mod errors;
pub mod identity;
pub mod ids;
pub mod leader;
pub mod publication;

pub use clock::Clock;
pub use commands::LibraryCommand;
pub use disconnect::DisconnectReason;
pub use dispatch::DispatchResult;
pub use errors::{GatewayError, GatewayErrorKind};
pub use identity::{LogonOutcome, SessionIdentityStore};
pub use ids::{CompositeKey, ConnectionDirection, ConnectionId, CorrelationId, LibraryId, SessionId};
pub use leader::LeadershipQuery;
pub use publication::{
    LogonRecord, LogonStatus, ManageConnectionRecord, ManagedSessionState, Position,
    PublicationBus, ReplyStatus, SessionInfo,
};
