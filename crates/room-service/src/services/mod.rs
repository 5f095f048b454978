//! Service layer for the room service.
//!
//! - `coordinator` - membership, authorization and room state changes
//! - `room_bus` - per-room change notification topics

pub mod coordinator;
pub mod room_bus;

pub use coordinator::{AuthenticatedSession, IssuedSession, LeaveOutcome, RoomCoordinator};
pub use room_bus::{RoomBus, RoomEvent, RoomSubscription};
