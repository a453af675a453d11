//! Inbound library commands (§4.2).
//!
//! Commands arrive as framed records from a Subscription (cluster-replicated
//! or plain) and are presented to the Framer one at a time by the command
//! dispatcher. This enum is the tagged union the dispatcher matches on,
//! mirrored the way this codebase tags its other wire enums (`kind` field,
//! `snake_case` variants) even though these records never leave the process
//! boundary as JSON in the reference deployment.

use serde::{Deserialize, Serialize};

use crate::ids::{ConnectionId, CorrelationId, LibraryId, SessionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConnect {
    pub library_id: LibraryId,
    pub correlation_id: CorrelationId,
    pub aeron_session_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceNumberType {
    Automatic,
    Explicit(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateConnection {
    pub library_id: LibraryId,
    pub port: u16,
    pub host: String,
    pub sender_comp_id: String,
    pub sender_sub_id: String,
    pub sender_location_id: String,
    pub target_comp_id: String,
    pub sequence_number_type: SequenceNumberType,
    pub initial_seq_num: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub heartbeat_interval_s: u32,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewaySessionStateWire {
    Connected,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSession {
    pub library_id: LibraryId,
    pub connection_id: ConnectionId,
    pub correlation_id: CorrelationId,
    pub session_state: GatewaySessionStateWire,
    pub heartbeat_interval_s: u32,
    pub last_sent_seq: i64,
    pub last_recv_seq: i64,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSession {
    pub library_id: LibraryId,
    pub session_id: SessionId,
    pub correlation_id: CorrelationId,
    /// `NO_MESSAGE_REPLAY` (`u64::MAX`) means no replay requested.
    pub last_received_seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disconnect {
    pub library_id: LibraryId,
    pub connection_id: ConnectionId,
    pub reason: crate::disconnect::DisconnectReason,
}

// `DisconnectReason` needs to round-trip through the command enum's derive;
// give it the same serde shape as the rest of this module's wire types.
impl Serialize for crate::disconnect::DisconnectReason {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::ApplicationDisconnect => "application_disconnect",
            Self::RemoteDisconnect => "remote_disconnect",
            Self::ChannelError => "channel_error",
            Self::NotLeader => "not_leader",
            Self::FailedAuthentication => "failed_authentication",
            Self::SessionHeartbeatTimeout => "session_heartbeat_timeout",
            Self::EngineShutdown => "engine_shutdown",
        };
        serializer.serialize_str(s)
    }
}

impl<'de> Deserialize<'de> for crate::disconnect::DisconnectReason {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "application_disconnect" => Ok(Self::ApplicationDisconnect),
            "remote_disconnect" => Ok(Self::RemoteDisconnect),
            "channel_error" => Ok(Self::ChannelError),
            "not_leader" => Ok(Self::NotLeader),
            "failed_authentication" => Ok(Self::FailedAuthentication),
            "session_heartbeat_timeout" => Ok(Self::SessionHeartbeatTimeout),
            "engine_shutdown" => Ok(Self::EngineShutdown),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &[
                    "application_disconnect",
                    "remote_disconnect",
                    "channel_error",
                    "not_leader",
                    "failed_authentication",
                    "session_heartbeat_timeout",
                    "engine_shutdown",
                ],
            )),
        }
    }
}

/// All recognised inbound library commands (§4.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
#[serde(rename_all = "snake_case")]
pub enum LibraryCommand {
    LibraryConnect(LibraryConnect),
    InitiateConnection(InitiateConnection),
    ReleaseSession(ReleaseSession),
    RequestSession(RequestSession),
    Disconnect(Disconnect),
}
