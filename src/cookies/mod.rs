//! Cookie subsystem.
//!
//! # Data Flow
//! ```text
//! Request:  Cookie header → jar.rs (parse) → signer.rs (unsign) → handler
//! Response: handler → signer.rs (sign) → jar.rs (Set-Cookie) → client
//! ```
//!
//! # Design Decisions
//! - Signing detects tampering; it does not hide the value
//! - Double signing and unsigning a plain value are rejected, never corrected
//! - Signatures are compared in constant time

pub mod jar;
pub mod signer;

pub use jar::{Cookie, CookieJar, CookieOptions, SameSite};
pub use signer::{is_signed, sign, sign_value, unsign, SIGNED_PREFIX};
