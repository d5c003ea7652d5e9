//! IP trust evaluation.
//!
//! Decides whether a peer address may set forwarding headers.
//!
//! # Design Decisions
//! - The untrusted set is checked first and always wins
//! - `"*"` anywhere in a set turns it into a wildcard
//! - Malformed entries are kept (so validation can report them) but never match

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// Wildcard entry matching every address.
pub const WILDCARD: &str = "*";

/// One configured address or CIDR range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpEntry {
    raw: String,
    net: Option<IpNet>,
}

impl IpEntry {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        let net = if trimmed.contains('/') {
            IpNet::from_str(trimmed).ok()
        } else {
            parse_ip(trimmed).map(IpNet::from)
        };
        Self { raw, net }
    }

    /// The entry as written in configuration.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// False when the entry is neither an address nor a CIDR range.
    pub fn is_valid(&self) -> bool {
        self.net.is_some()
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        match self.net {
            Some(net) => net.contains(addr) || net.contains(&addr.to_canonical()),
            None => false,
        }
    }
}

/// A set of addresses: either the wildcard or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawIpSet", into = "RawIpSet")]
pub enum IpSet {
    Any,
    List(Vec<IpEntry>),
}

impl IpSet {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: Vec<String> = entries.into_iter().map(Into::into).collect();
        if entries.iter().any(|e| e.trim() == WILDCARD) {
            return IpSet::Any;
        }
        IpSet::List(entries.into_iter().map(IpEntry::parse).collect())
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, IpSet::Any)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, IpSet::List(entries) if entries.is_empty())
    }

    /// Entries that failed to parse.
    pub fn invalid_entries(&self) -> impl Iterator<Item = &IpEntry> {
        let entries: &[IpEntry] = match self {
            IpSet::Any => &[],
            IpSet::List(entries) => entries,
        };
        entries.iter().filter(|e| !e.is_valid())
    }

    /// Whether `ip` falls in the set. An unparseable `ip` only matches the wildcard.
    pub fn matches(&self, ip: &str) -> bool {
        match self {
            IpSet::Any => true,
            IpSet::List(entries) => match parse_ip(ip) {
                Some(addr) => entries.iter().any(|e| e.contains(&addr)),
                None => false,
            },
        }
    }
}

impl Default for IpSet {
    fn default() -> Self {
        IpSet::List(Vec::new())
    }
}

impl fmt::Display for IpSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpSet::Any => write!(f, "{WILDCARD}"),
            IpSet::List(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", entry.as_str())?;
                }
                Ok(())
            }
        }
    }
}

/// Config representation: `"*"`, a single entry, or a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawIpSet {
    One(String),
    Many(Vec<String>),
}

impl From<RawIpSet> for IpSet {
    fn from(raw: RawIpSet) -> Self {
        match raw {
            RawIpSet::One(entry) => IpSet::from_entries([entry]),
            RawIpSet::Many(entries) => IpSet::from_entries(entries),
        }
    }
}

impl From<IpSet> for RawIpSet {
    fn from(set: IpSet) -> Self {
        match set {
            IpSet::Any => RawIpSet::One(WILDCARD.to_string()),
            IpSet::List(entries) => RawIpSet::Many(entries.into_iter().map(|e| e.raw).collect()),
        }
    }
}

/// Trusted/untrusted pair evaluated together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpTrust {
    trusted: IpSet,
    untrusted: IpSet,
}

impl IpTrust {
    pub fn new(trusted: IpSet, untrusted: IpSet) -> Self {
        Self { trusted, untrusted }
    }

    pub fn is_trusted(&self, ip: &str) -> bool {
        is_ip_trusted(ip, &self.trusted, &self.untrusted)
    }
}

/// Returns true if `ip` is in `trusted` and not in `untrusted`.
pub fn is_ip_trusted(ip: &str, trusted: &IpSet, untrusted: &IpSet) -> bool {
    if untrusted.matches(ip) {
        return false;
    }
    trusted.matches(ip)
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    let raw = raw
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .unwrap_or(raw);
    IpAddr::from_str(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(entries: &[&str]) -> IpSet {
        IpSet::from_entries(entries.iter().copied())
    }

    #[test]
    fn test_wildcard_untrusted_rejects_everything() {
        let trusted = set(&["*"]);
        let untrusted = set(&["*"]);
        assert!(!is_ip_trusted("127.0.0.1", &trusted, &untrusted));
        assert!(!is_ip_trusted("::1", &trusted, &untrusted));
    }

    #[test]
    fn test_wildcard_trusted_accepts_everything() {
        let trusted = set(&["*"]);
        let untrusted = IpSet::default();
        assert!(is_ip_trusted("203.0.113.9", &trusted, &untrusted));
        assert!(is_ip_trusted("not-an-ip", &trusted, &untrusted));
    }

    #[test]
    fn test_untrusted_overrides_trusted() {
        let trusted = set(&["10.0.0.0/8"]);
        let untrusted = set(&["10.0.0.5"]);
        assert!(is_ip_trusted("10.0.0.4", &trusted, &untrusted));
        assert!(!is_ip_trusted("10.0.0.5", &trusted, &untrusted));
    }

    #[test]
    fn test_cidr_and_literal_matching() {
        let trusted = set(&["192.168.1.0/24", "2001:db8::1"]);
        let untrusted = IpSet::default();
        assert!(is_ip_trusted("192.168.1.200", &trusted, &untrusted));
        assert!(!is_ip_trusted("192.168.2.1", &trusted, &untrusted));
        assert!(is_ip_trusted("2001:db8::1", &trusted, &untrusted));
        assert!(!is_ip_trusted("2001:db8::2", &trusted, &untrusted));
    }

    #[test]
    fn test_ipv4_mapped_ipv6_matches_ipv4_range() {
        let trusted = set(&["127.0.0.0/8"]);
        assert!(is_ip_trusted("::ffff:127.0.0.1", &trusted, &IpSet::default()));
    }

    #[test]
    fn test_malformed_entries_never_match() {
        let trusted = set(&["10.0.0.0/99", "bogus"]);
        assert!(!is_ip_trusted("10.0.0.1", &trusted, &IpSet::default()));
        assert_eq!(trusted.invalid_entries().count(), 2);
    }

    #[test]
    fn test_empty_trusted_set_trusts_nobody() {
        assert!(!is_ip_trusted("127.0.0.1", &IpSet::default(), &IpSet::default()));
    }

    #[test]
    fn test_ip_trust_struct() {
        let trust = IpTrust::new(set(&["127.0.0.1"]), IpSet::default());
        assert!(trust.is_trusted("127.0.0.1"));
        assert!(!trust.is_trusted("127.0.0.2"));
    }

    #[test]
    fn test_deserialize_wildcard_string_and_list() {
        #[derive(Deserialize)]
        struct Wrapper {
            ips: IpSet,
        }

        let w: Wrapper = toml::from_str(r#"ips = "*""#).unwrap();
        assert!(w.ips.is_wildcard());

        let w: Wrapper = toml::from_str(r#"ips = ["10.0.0.0/8", "*"]"#).unwrap();
        assert!(w.ips.is_wildcard());

        let w: Wrapper = toml::from_str(r#"ips = ["10.0.0.0/8"]"#).unwrap();
        assert!(w.ips.matches("10.1.2.3"));
    }

    proptest! {
        #[test]
        fn prop_wildcard_untrusted_is_never_trusted(a in any::<u8>(), b in any::<u8>(), c in any::<u8>(), d in any::<u8>()) {
            let ip = format!("{a}.{b}.{c}.{d}");
            prop_assert!(!is_ip_trusted(&ip, &set(&["*"]), &set(&["*"])));
        }

        #[test]
        fn prop_wildcard_trusted_is_always_trusted(ip in ".*") {
            prop_assert!(is_ip_trusted(&ip, &set(&["*"]), &IpSet::default()));
        }

        #[test]
        fn prop_untrusted_match_overrides(a in any::<u8>(), b in any::<u8>()) {
            let ip = format!("10.0.{a}.{b}");
            prop_assert!(!is_ip_trusted(&ip, &set(&["10.0.0.0/16"]), &set(&["10.0.0.0/16"])));
        }
    }
}
