//! Cookie parsing and `Set-Cookie` serialization.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use axum::http::{header, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::config::CookieConfig;
use crate::cookies::signer;
use crate::error::CookieError;

/// `SameSite` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes written alongside a cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
    pub domain: Option<String>,
    pub path: Option<String>,
    pub max_age: Option<Duration>,
    pub expires: Option<SystemTime>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl From<&CookieConfig> for CookieOptions {
    fn from(config: &CookieConfig) -> Self {
        Self {
            domain: config.domain.clone(),
            path: Some(config.path.clone()),
            max_age: config.max_age_secs.map(Duration::from_secs),
            expires: None,
            http_only: config.http_only,
            secure: config.secure,
            same_site: Some(config.same_site),
        }
    }
}

/// A single name/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Result<Self, CookieError> {
        let name = name.into();
        let value = value.into();
        if !is_token(&name) {
            return Err(CookieError::InvalidName(name));
        }
        if !value.bytes().all(is_cookie_octet) {
            return Err(CookieError::InvalidValue(name));
        }
        Ok(Self { name, value })
    }

    /// Replace the value with its signed form.
    pub fn signed(self, secret: &str) -> Result<Self, CookieError> {
        let value = signer::sign(&self.value, secret)?;
        Self::new(self.name, value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Render the `Set-Cookie` header value.
    pub fn to_set_cookie(&self, options: &CookieOptions) -> String {
        let mut out = format!("{}={}", self.name, self.value);

        if let Some(max_age) = options.max_age {
            out.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        if let Some(domain) = &options.domain {
            out.push_str(&format!("; Domain={domain}"));
        }
        if let Some(path) = &options.path {
            out.push_str(&format!("; Path={path}"));
        }
        if let Some(expires) = options.expires {
            out.push_str(&format!("; Expires={}", httpdate::fmt_http_date(expires)));
        }
        if options.http_only {
            out.push_str("; HttpOnly");
        }
        if options.secure {
            out.push_str("; Secure");
        }
        if let Some(same_site) = options.same_site {
            out.push_str(&format!("; SameSite={}", same_site.as_str()));
        }
        out
    }

    pub fn to_header_value(&self, options: &CookieOptions) -> Result<HeaderValue, CookieError> {
        HeaderValue::from_str(&self.to_set_cookie(options))
            .map_err(|_| CookieError::InvalidValue(self.name.clone()))
    }

    /// A `Set-Cookie` value that deletes the cookie `name`.
    pub fn removal(name: &str, options: &CookieOptions) -> Result<HeaderValue, CookieError> {
        let options = CookieOptions {
            max_age: Some(Duration::ZERO),
            expires: Some(SystemTime::UNIX_EPOCH),
            ..options.clone()
        };
        Cookie::new(name, "")?.to_header_value(&options)
    }
}

/// Cookies sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: HashMap<String, String>,
}

impl CookieJar {
    /// Parse every `Cookie` header. The first occurrence of a name wins.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cookies = HashMap::new();
        for value in headers.get_all(header::COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for pair in value.split(';') {
                let Some((name, value)) = pair.split_once('=') else {
                    continue;
                };
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                cookies
                    .entry(name.to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
        Self { cookies }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Verified value of a signed cookie, `Ok(None)` when absent.
    pub fn get_signed(&self, name: &str, secret: &str) -> Result<Option<String>, CookieError> {
        self.get(name)
            .map(|token| signer::unsign(Some(token), secret))
            .transpose()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

// RFC 6265 cookie-octet.
fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}
