//! Forwarded-header resolution.
//!
//! Decides which protocol and hostname a request was originally addressed to.
//! `X-Forwarded-Proto` and `X-Forwarded-Host` are attacker-controllable, so they
//! are only honored when the peer passes the [`trust`](super::trust) check. The
//! final hostname is always re-validated, whatever its source.

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use axum::http::{header, HeaderMap, HeaderValue};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::TrustConfig;
use crate::error::HttpError;
use crate::security::trust::is_ip_trusted;

pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// An allowed hostname: exact literal or regular expression.
///
/// In configuration, `"/<regex>/"` denotes a pattern; anything else is a literal.
/// Patterns are unanchored, so anchor them explicitly when needed.
#[derive(Debug, Clone)]
pub enum HostPattern {
    Literal(String),
    Pattern { source: String, regex: Option<Regex> },
}

impl HostPattern {
    pub fn parse(raw: &str) -> Self {
        match raw
            .strip_prefix('/')
            .and_then(|r| r.strip_suffix('/'))
            .filter(|r| !r.is_empty())
        {
            Some(source) => HostPattern::Pattern {
                source: source.to_string(),
                regex: Regex::new(source).ok(),
            },
            None => HostPattern::Literal(raw.to_string()),
        }
    }

    pub fn regex(source: &str) -> Result<Self, regex::Error> {
        Ok(HostPattern::Pattern {
            source: source.to_string(),
            regex: Some(Regex::new(source)?),
        })
    }

    pub fn matches(&self, hostname: &str) -> bool {
        match self {
            HostPattern::Literal(literal) => literal == hostname,
            HostPattern::Pattern { regex: Some(regex), .. } => regex.is_match(hostname),
            HostPattern::Pattern { regex: None, .. } => false,
        }
    }

    /// False for a pattern whose regex failed to compile.
    pub fn is_valid(&self) -> bool {
        !matches!(self, HostPattern::Pattern { regex: None, .. })
    }
}

impl PartialEq for HostPattern {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for HostPattern {}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPattern::Literal(literal) => write!(f, "{literal}"),
            HostPattern::Pattern { source, .. } => write!(f, "/{source}/"),
        }
    }
}

impl From<String> for HostPattern {
    fn from(raw: String) -> Self {
        HostPattern::parse(&raw)
    }
}

impl Serialize for HostPattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HostPattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(HostPattern::from)
    }
}

/// What a request arrived with. Built once per request and never mutated.
#[derive(Debug, Clone)]
pub struct RequestOrigin {
    remote_ip: String,
    headers: HeaderMap,
    encrypted: bool,
}

impl RequestOrigin {
    pub fn new(remote_ip: impl Into<String>, headers: HeaderMap, encrypted: bool) -> Self {
        Self {
            remote_ip: remote_ip.into(),
            headers,
            encrypted,
        }
    }

    pub fn remote_ip(&self) -> &str {
        &self.remote_ip
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }
}

/// Client-facing protocol and hostname after proxy resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedOrigin {
    pub protocol: String,
    pub hostname: Option<String>,
}

impl ResolvedOrigin {
    pub fn is_secure(&self) -> bool {
        self.protocol.eq_ignore_ascii_case("https")
    }
}

/// Resolve both protocol and hostname.
pub fn resolve_origin(origin: &RequestOrigin, trust: &TrustConfig) -> Result<ResolvedOrigin, HttpError> {
    let protocol = resolve_protocol(origin.remote_ip(), origin.headers(), origin.is_encrypted(), trust);
    let hostname = resolve_hostname(origin.remote_ip(), origin.headers(), trust)?;
    Ok(ResolvedOrigin { protocol, hostname })
}

/// `"https"` for encrypted connections, `"http"` otherwise, unless a trusted
/// peer says differently through `X-Forwarded-Proto`.
pub fn resolve_protocol(ip: &str, headers: &HeaderMap, encrypted: bool, trust: &TrustConfig) -> String {
    let default = if encrypted { "https" } else { "http" };

    if !is_ip_trusted(ip, &trust.trusted_ips, &trust.untrusted_ips) {
        return default.to_string();
    }

    first_token(headers, X_FORWARDED_PROTO)
        .map(|proto| proto.trim().to_string())
        .filter(|proto| !proto.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Hostname from `Host`, or from `X-Forwarded-Host` when the peer is trusted.
///
/// Returns `Ok(None)` when neither header is present. A header that is present
/// but not UTF-8 is decoded lossily, so it still goes through validation. The
/// hostname is normalized and validated; malformed or non-allowed hosts are
/// rejected as suspicious operations.
pub fn resolve_hostname(ip: &str, headers: &HeaderMap, trust: &TrustConfig) -> Result<Option<String>, HttpError> {
    let mut hostname = headers.get(header::HOST).map(header_text);

    if is_ip_trusted(ip, &trust.trusted_ips, &trust.untrusted_ips) {
        if let Some(forwarded) = first_token(headers, X_FORWARDED_HOST).filter(|h| !h.is_empty()) {
            hostname = Some(forwarded);
        }
    }

    let Some(hostname) = hostname else {
        return Ok(None);
    };

    let hostname = normalize_hostname(&hostname);

    if !is_valid_hostname(&hostname) {
        tracing::warn!(ip = %ip, host = %hostname, "Rejected invalid host");
        return Err(HttpError::suspicious_operation("Invalid Host", ip, &hostname));
    }

    if !trust.trusted_hosts.is_empty() && !trust.trusted_hosts.iter().any(|p| p.matches(&hostname)) {
        tracing::warn!(ip = %ip, host = %hostname, "Rejected untrusted host");
        return Err(HttpError::suspicious_operation("Untrusted Host", ip, &hostname));
    }

    Ok(Some(hostname))
}

/// Keep a bracketed IPv6 literal as-is; otherwise trim, drop the port and lowercase.
pub fn normalize_hostname(raw: &str) -> String {
    if let Some(literal) = ipv6_literal().captures(raw).and_then(|c| c.get(1)) {
        return format!("[{}]", literal.as_str());
    }
    trailing_port().replace(raw.trim(), "").to_lowercase()
}

/// Label syntax check. An optional leading `[` is allowed; the remainder must not be
/// all digits, must not start with `-`, and must consist of 1..=63 character groups of
/// `[a-zA-Z0-9-:\]]`, each optionally followed by a dot.
pub fn is_valid_hostname(hostname: &str) -> bool {
    let rest = hostname.strip_prefix('[').unwrap_or(hostname);
    if rest.is_empty() || rest.starts_with('-') || rest.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    host_syntax().is_match(hostname)
}

fn header_text(value: &HeaderValue) -> Cow<'_, str> {
    String::from_utf8_lossy(value.as_bytes())
}

fn first_token<'a>(headers: &'a HeaderMap, name: &str) -> Option<Cow<'a, str>> {
    let value = header_text(headers.get(name)?);
    Some(match value {
        Cow::Borrowed(v) => Cow::Borrowed(v.split(',').next().unwrap_or_default()),
        Cow::Owned(v) => Cow::Owned(v.split(',').next().unwrap_or_default().to_string()),
    })
}

fn ipv6_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([0-9a-fA-F:]+)\]").expect("static regex"))
}

fn trailing_port() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":\d+$").expect("static regex"))
}

fn host_syntax() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[?(?:[a-zA-Z0-9\-:\]]{1,63}\.?)+$").expect("static regex"))
}
