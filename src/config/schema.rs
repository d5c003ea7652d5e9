//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the kit.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cookies::SameSite;
use crate::security::{HostPattern, IpSet};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct KitConfig {
    /// Listener configuration (bind address, transport security).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Trusted proxies and allowed hosts.
    pub trust: TrustConfig,

    /// Cookie signing and attributes.
    pub cookies: CookieConfig,

    /// Multipart upload limits.
    pub uploads: UploadConfig,

    /// File serving settings.
    pub files: FileConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Whether connections reaching this listener are already encrypted
    /// (TLS terminated in front of it, or in-process).
    pub encrypted: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            encrypted: false,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Which peers may set forwarding headers, and which hosts are served.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TrustConfig {
    /// Addresses or CIDR ranges allowed to set `X-Forwarded-*`, or `"*"`.
    pub trusted_ips: IpSet,

    /// Addresses or CIDR ranges never trusted, or `"*"`. Checked first.
    pub untrusted_ips: IpSet,

    /// Allowed hostnames. Empty means any syntactically valid host.
    pub trusted_hosts: Vec<HostPattern>,
}

/// Cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CookieConfig {
    /// Signing secret. Signed cookies are unavailable while empty.
    pub secret: String,

    /// Name of the session cookie issued by the server.
    pub session_name: String,

    pub domain: Option<String>,
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub max_age_secs: Option<u64>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            session_name: "session".to_string(),
            domain: None,
            path: "/".to_string(),
            http_only: true,
            secure: false,
            same_site: SameSite::Lax,
            max_age_secs: None,
        }
    }
}

/// Upload limits. Unset limits are unbounded.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_size: Option<ByteSize>,
    pub max_field_size: Option<ByteSize>,
    pub max_field_name_size: Option<ByteSize>,

    /// Prefix of temporary file names.
    pub prefix: String,

    /// Directory for temporary files (defaults to the OS temp dir).
    pub temp_dir: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: None,
            max_field_size: None,
            max_field_name_size: None,
            prefix: "file".to_string(),
            temp_dir: None,
        }
    }
}

/// File serving configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileConfig {
    /// Directory files are served from.
    pub root: PathBuf,

    /// Extra headers added to every file response.
    pub headers: BTreeMap<String, String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("public"),
            headers: BTreeMap::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

/// A size in bytes. Accepts integers or strings such as `"512kb"` or `"1.5mb"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawByteSize", into = "u64")]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<ByteSize> for u64 {
    fn from(size: ByteSize) -> Self {
        size.0
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl std::str::FromStr for ByteSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_byte_size(s).map(ByteSize)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawByteSize {
    Int(u64),
    Text(String),
}

impl TryFrom<RawByteSize> for ByteSize {
    type Error = String;

    fn try_from(raw: RawByteSize) -> Result<Self, Self::Error> {
        match raw {
            RawByteSize::Int(n) => Ok(ByteSize(n)),
            RawByteSize::Text(s) => s.parse(),
        }
    }
}

/// Parse a human-readable size using 1024-based units (b, kb, mb, gb, tb, pb).
pub fn parse_byte_size(raw: &str) -> Result<u64, String> {
    let s = raw.trim().to_ascii_lowercase();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let number: f64 = number
        .parse()
        .map_err(|_| format!("invalid byte size: {raw:?}"))?;
    let multiplier: u64 = match unit.trim() {
        "" | "b" => 1,
        "kb" => 1 << 10,
        "mb" => 1 << 20,
        "gb" => 1 << 30,
        "tb" => 1 << 40,
        "pb" => 1 << 50,
        other => return Err(format!("unknown byte size unit {other:?} in {raw:?}")),
    };

    Ok((number * multiplier as f64).floor() as u64)
}
