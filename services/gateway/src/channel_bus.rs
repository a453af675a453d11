//! Default in-process [`PublicationBus`] for solo deployments.
//!
//! Production multi-node deployments publish onto a replicated, durable log
//! outside this crate's scope (§1); this implementation is a bounded
//! in-process channel that gives the same back-pressure contract
//! (`Position::BackPressured` when the buffer is full) so a standalone node
//! or an integration test can exercise the retry path end to end without a
//! real cluster.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};

use gw_protocol::publication::{
    LogonRecord, ManageConnectionRecord, Position, PublicationBus, ReplyStatus, SessionInfo,
};
use gw_protocol::{GatewayError, LibraryId};

/// One record published to the bus. Downstream consumers (libraries, the
/// replicated log) would decode this further; this crate only needs to move
/// it off the Framer's thread.
#[derive(Debug, Clone)]
pub enum PublishedRecord {
    ManageConnection(ManageConnectionRecord),
    Logon(LogonRecord),
    Error(GatewayError),
    ReleaseSessionReply { status: ReplyStatus, correlation_id: u64 },
    RequestSessionReply { status: ReplyStatus, correlation_id: u64 },
    ApplicationHeartbeat(LibraryId),
    ControlNotification { library_id: LibraryId, sessions: Vec<SessionInfo> },
    LibraryTimeout(LibraryId),
}

/// A [`PublicationBus`] backed by a bounded channel. `try_send` failing with
/// `Full` is reported as [`Position::BackPressured`]; anything else
/// (the receiver having been dropped) is treated as an always-full bus,
/// since there is no durable fallback to fall back to here.
pub struct ChannelPublicationBus {
    sender: SyncSender<PublishedRecord>,
    next_position: i64,
}

impl ChannelPublicationBus {
    fn publish(&mut self, record: PublishedRecord) -> Position {
        match self.sender.try_send(record) {
            Ok(()) => {
                let pos = self.next_position;
                self.next_position += 1;
                Position::Committed(pos)
            }
            Err(TrySendError::Full(_)) => Position::BackPressured,
            Err(TrySendError::Disconnected(_)) => Position::BackPressured,
        }
    }
}

/// Builds a bus/receiver pair with the given channel capacity.
pub fn channel_bus(capacity: usize) -> (ChannelPublicationBus, Receiver<PublishedRecord>) {
    let (sender, receiver) = sync_channel(capacity);
    (
        ChannelPublicationBus {
            sender,
            next_position: 1,
        },
        receiver,
    )
}

impl PublicationBus for ChannelPublicationBus {
    fn save_manage_connection(&mut self, record: ManageConnectionRecord) -> Position {
        self.publish(PublishedRecord::ManageConnection(record))
    }

    fn save_logon(&mut self, record: LogonRecord) -> Position {
        self.publish(PublishedRecord::Logon(record))
    }

    fn save_error(&mut self, error: GatewayError) -> Position {
        self.publish(PublishedRecord::Error(error))
    }

    fn save_release_session_reply(&mut self, status: ReplyStatus, correlation_id: u64) -> Position {
        self.publish(PublishedRecord::ReleaseSessionReply { status, correlation_id })
    }

    fn save_request_session_reply(&mut self, status: ReplyStatus, correlation_id: u64) -> Position {
        self.publish(PublishedRecord::RequestSessionReply { status, correlation_id })
    }

    fn save_application_heartbeat(&mut self, library_id: LibraryId) -> Position {
        self.publish(PublishedRecord::ApplicationHeartbeat(library_id))
    }

    fn save_control_notification(
        &mut self,
        library_id: LibraryId,
        sessions: Vec<SessionInfo>,
    ) -> Position {
        self.publish(PublishedRecord::ControlNotification { library_id, sessions })
    }

    fn save_library_timeout(&mut self, library_id: LibraryId) -> Position {
        self.publish(PublishedRecord::LibraryTimeout(library_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_protocol::{ConnectionDirection, ConnectionId, SessionId};
    use gw_protocol::publication::ManagedSessionState;

    #[test]
    fn back_pressures_once_capacity_is_exhausted() {
        let (mut bus, _rx) = channel_bus(1);
        let record = ManageConnectionRecord {
            connection_id: ConnectionId(1),
            session_id: SessionId(1),
            address: "127.0.0.1:1".to_owned(),
            library_id: LibraryId(1),
            direction: ConnectionDirection::Acceptor,
            last_sent_seq: 0,
            last_recv_seq: 0,
            state: ManagedSessionState::Connected,
            heartbeat_interval_s: 30,
        };
        assert!(matches!(
            bus.save_manage_connection(record.clone()),
            Position::Committed(_)
        ));
        assert_eq!(bus.save_manage_connection(record), Position::BackPressured);
    }
}
