//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → KitConfig (validated, immutable)
//!     → shared via Arc<ArcSwap<_>> with request handlers
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap in the server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Trust settings are plain values handed to the resolvers, never globals

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ByteSize, CookieConfig, FileConfig, KitConfig, ListenerConfig, ObservabilityConfig,
    TimeoutConfig, TrustConfig, UploadConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
