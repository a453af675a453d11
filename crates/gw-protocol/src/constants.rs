//! Fixed constants referenced throughout the gateway (§6).

use crate::ids::LibraryId;

/// The pseudo-library that owns every [`crate::ids::ConnectionId`] not yet
/// handed off to a real library.
pub const ENGINE_LIBRARY_ID: LibraryId = LibraryId(0);

/// Sentinel for `RequestSession.last_received_seq` meaning "no replay requested".
pub const NO_MESSAGE_REPLAY: u64 = u64::MAX;

/// Sentinel requesting that sequence numbering start fresh on `InitiateConnection`.
pub const AUTOMATIC_INITIAL_SEQUENCE_NUMBER: i64 = -1;
