//! Observability for the room service.
//!
//! Provides metric definitions and recording helpers.

pub mod metrics;
