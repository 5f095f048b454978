//! Primitives shared by the listening-room crates.

#![warn(clippy::pedantic)]

/// Secret wrappers that keep credentials out of logs
pub mod secret;

/// Session token limits and claim checks
pub mod jwt;
