//! Background tasks for the room service.
//!
//! # Tasks
//!
//! - `room_retention` - Daily deletion of rooms past their retention window
//! - `listener_idle` - Clears the listening flag of members without a recent heartbeat
//!
//! Both run independently of request traffic and of each other. Their queries
//! are idempotent, so an overlapping run does no harm.

pub mod listener_idle;
pub mod room_retention;

pub use listener_idle::{start_listener_idle_sweep, ListenerIdleConfig};
pub use room_retention::{start_room_retention, RoomRetentionConfig};
