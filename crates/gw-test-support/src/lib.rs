//! Test doubles for the gateway's external collaborators.
//!
//! Depends only on `gw-protocol`, mirroring the rest of this codebase's
//! split between a protocol crate and a companion test-utils crate that
//! never depends back on the service consuming it.

mod fake_clock;
mod mock_bus;
mod mock_identity;

pub use fake_clock::FakeClock;
pub use gw_protocol::leader::StaticLeadership;
pub use mock_bus::{MockPublicationBus, Recorded};
pub use mock_identity::MockSessionIdentityStore;
