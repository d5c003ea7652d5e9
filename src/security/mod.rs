//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → trust.rs (is the peer allowed to set X-Forwarded-*?)
//!     → proxy.rs (resolve protocol + hostname, validate host)
//!     → Pass ResolvedOrigin to handlers
//! ```
//!
//! # Design Decisions
//! - Fail closed: an invalid or non-allowed host rejects the request
//! - No trust in client input unless the peer is explicitly trusted
//! - Trust settings are passed in explicitly, never read from globals

pub mod proxy;
pub mod trust;

pub use proxy::{
    is_valid_hostname, normalize_hostname, resolve_hostname, resolve_origin, resolve_protocol,
    HostPattern, RequestOrigin, ResolvedOrigin, X_FORWARDED_HOST, X_FORWARDED_PROTO,
};
pub use trust::{is_ip_trusted, IpEntry, IpSet, IpTrust};
