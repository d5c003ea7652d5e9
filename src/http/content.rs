//! Content-Type inspection.

use axum::http::{header, HeaderMap};

pub const DEFAULT_TYPE: &str = "text/plain";
pub const DEFAULT_CHARSET: &str = "utf-8";

/// Lowercased `type/subtype` of a Content-Type value, or `fallback` when it does not parse.
pub fn content_type(value: &str, fallback: &str) -> String {
    parse_essence(value).unwrap_or_else(|| fallback.to_string())
}

/// `charset` parameter of a Content-Type value, or `fallback`.
pub fn charset(value: &str, fallback: &str) -> String {
    if parse_essence(value).is_none() {
        return fallback.to_string();
    }
    value
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, v)| v.trim().trim_matches('"').to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// True for any `multipart/*` type.
pub fn is_multipart(value: &str) -> bool {
    parse_essence(value).is_some_and(|essence| essence.starts_with("multipart/"))
}

/// [`is_multipart`] applied to a request's Content-Type header.
pub fn is_multipart_request(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_multipart)
}

fn parse_essence(value: &str) -> Option<String> {
    let essence = value.split(';').next()?.trim();
    let (ty, subtype) = essence.split_once('/')?;
    if !is_token(ty) || !is_token(subtype) {
        return None;
    }
    Some(essence.to_ascii_lowercase())
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}
