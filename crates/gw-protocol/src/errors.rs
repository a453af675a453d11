//! Protocol error taxonomy published to libraries (§7).

use std::fmt;

/// Kinds of protocol error surfaced to a library via `save_error`. These are
/// data, not exceptions: a handler that hits one of these builds a
/// [`GatewayError`] and publishes it, it never unwinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    UnknownLibrary,
    UnableToConnect,
    DuplicateSession,
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GatewayErrorKind::UnknownLibrary => "UNKNOWN_LIBRARY",
            GatewayErrorKind::UnableToConnect => "UNABLE_TO_CONNECT",
            GatewayErrorKind::DuplicateSession => "DUPLICATE_SESSION",
        };
        f.write_str(s)
    }
}

/// A protocol error ready to publish on the bus (`save_error`, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub library_id: crate::ids::LibraryId,
    pub reply_to_correlation_id: Option<u64>,
    pub message: String,
}

impl GatewayError {
    pub fn new(
        kind: GatewayErrorKind,
        library_id: crate::ids::LibraryId,
        reply_to_correlation_id: Option<u64>,
        message: impl Into<String>,
    ) -> Self {
        GatewayError {
            kind,
            library_id,
            reply_to_correlation_id,
            message: message.into(),
        }
    }
}
