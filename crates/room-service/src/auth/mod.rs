//! Session token issuing and decoding.
//!
//! Decoding proves only that this service signed the token and that it has
//! not expired. Whether the session is still live is decided by the
//! coordinator against current membership.

pub mod claims;
pub mod token;

pub use claims::SessionClaims;
pub use token::{IssuedToken, SessionTokenService};
