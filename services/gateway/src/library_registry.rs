//! Set of connected libraries (§2.7, §3 `Library`).

use std::collections::{HashMap, HashSet};

use gw_protocol::{ConnectionId, LibraryId};

/// A connected library and the connections it currently owns.
#[derive(Debug, Clone)]
pub struct Library {
    pub library_id: LibraryId,
    pub aeron_session_id: i64,
    pub last_heartbeat_ms: u64,
    pub owned_connections: HashSet<ConnectionId>,
}

/// Registry of every library known to the Framer.
#[derive(Debug, Default)]
pub struct LibraryRegistry {
    libraries: HashMap<LibraryId, Library>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        LibraryRegistry::default()
    }

    pub fn is_known(&self, library_id: LibraryId) -> bool {
        self.libraries.contains_key(&library_id)
    }

    pub fn get(&self, library_id: LibraryId) -> Option<&Library> {
        self.libraries.get(&library_id)
    }

    /// Registers a library, or refreshes its heartbeat/session id if already
    /// known. Returns `true` if this is the library's first observation,
    /// `false` if it is a reconnect (§4.2 `LibraryConnect`).
    pub fn connect(&mut self, library_id: LibraryId, aeron_session_id: i64, now_ms: u64) -> bool {
        if let Some(existing) = self.libraries.get_mut(&library_id) {
            existing.aeron_session_id = aeron_session_id;
            existing.last_heartbeat_ms = now_ms;
            false
        } else {
            self.libraries.insert(
                library_id,
                Library {
                    library_id,
                    aeron_session_id,
                    last_heartbeat_ms: now_ms,
                    owned_connections: HashSet::new(),
                },
            );
            true
        }
    }

    pub fn touch_heartbeat(&mut self, library_id: LibraryId, now_ms: u64) {
        if let Some(library) = self.libraries.get_mut(&library_id) {
            library.last_heartbeat_ms = now_ms;
        }
    }

    pub fn assign_connection(&mut self, library_id: LibraryId, connection_id: ConnectionId) {
        if let Some(library) = self.libraries.get_mut(&library_id) {
            library.owned_connections.insert(connection_id);
        }
    }

    pub fn unassign_connection(&mut self, library_id: LibraryId, connection_id: ConnectionId) {
        if let Some(library) = self.libraries.get_mut(&library_id) {
            library.owned_connections.remove(&connection_id);
        }
    }

    pub fn owned_connections(&self, library_id: LibraryId) -> Vec<ConnectionId> {
        self.libraries
            .get(&library_id)
            .map(|l| l.owned_connections.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns every library whose heartbeat has lapsed beyond
    /// `reply_timeout_ms` as of `now_ms` (§4.4).
    pub fn timed_out(&self, now_ms: u64, reply_timeout_ms: u64) -> Vec<LibraryId> {
        self.libraries
            .values()
            .filter(|l| now_ms.saturating_sub(l.last_heartbeat_ms) > reply_timeout_ms)
            .map(|l| l.library_id)
            .collect()
    }

    /// Removes a library and returns its record (its owned connections are
    /// the caller's responsibility to reclaim, §4.4).
    pub fn remove(&mut self, library_id: LibraryId) -> Option<Library> {
        self.libraries.remove(&library_id)
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    pub fn clear(&mut self) {
        self.libraries.clear();
    }
}
