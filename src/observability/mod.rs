//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: ip, host, code, path)
//!     → logging.rs (subscriber: env filter + fmt/json layer)
//!     → stdout
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON optional) for machine parsing
//! - `RUST_LOG` overrides the configured level

pub mod logging;
