//! Secret types for values that must never reach a log line.
//!
//! Re-exports [`secrecy`] so every crate in the workspace wraps signing keys
//! and issued session tokens the same way. `Debug` on these types prints a
//! redaction marker, so a struct deriving `Debug` stays safe to trace.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct SigningConfig {
//!     issuer: String,
//!     key: SecretString,
//! }
//!
//! let cfg = SigningConfig {
//!     issuer: "room-service".to_string(),
//!     key: SecretString::from("0123456789abcdef0123456789abcdef"),
//! };
//!
//! assert!(!format!("{cfg:?}").contains("0123456789"));
//! let raw: &str = cfg.key.expose_secret();
//! assert_eq!(raw.len(), 32);
//! ```
//!
//! Use `SecretString` for the token signing key and for tokens handed back to
//! clients. Reach for `expose_secret()` only at the point where the raw bytes
//! are consumed (signing, writing a cookie header).

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
