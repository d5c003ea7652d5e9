//! Tamper-evident cookie values.
//!
//! A signed value has the form `$$s$$:<value>.<sig>` where `sig` is the
//! base64url (no padding) HMAC-SHA256 of `<value>` keyed by the secret.
//! Values are not encrypted.

use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::CookieError;

/// Marker prepended to every signed value.
pub const SIGNED_PREFIX: &str = "$$s$$:";

const HMAC_SHA256_SIG_LEN: usize = 32;
// 32 bytes of base64url without padding.
const HMAC_SHA256_SIG_B64_LEN: usize = 43;

/// True when `value` carries the signed prefix.
pub fn is_signed(value: &str) -> bool {
    value.starts_with(SIGNED_PREFIX)
}

/// Sign `value` with `secret`.
///
/// Fails when the secret is empty or when `value` is already signed.
pub fn sign(value: &str, secret: &str) -> Result<String, CookieError> {
    if secret.is_empty() {
        return Err(CookieError::MissingSecret);
    }
    if is_signed(value) {
        return Err(CookieError::AlreadySigned);
    }

    let sig = hmac_sha256(secret.as_bytes(), value.as_bytes());
    Ok(format!(
        "{SIGNED_PREFIX}{value}.{}",
        general_purpose::URL_SAFE_NO_PAD.encode(sig)
    ))
}

/// Sign a dynamically typed value. Only JSON strings can be signed.
pub fn sign_value(value: &serde_json::Value, secret: &str) -> Result<String, CookieError> {
    match value {
        serde_json::Value::String(s) => sign(s, secret),
        _ => Err(CookieError::NotAString),
    }
}

/// Verify `token` and return the original value.
///
/// Fails when the token is missing or unsigned, when the secret is empty, or
/// when the signature does not match.
pub fn unsign(token: Option<&str>, secret: &str) -> Result<String, CookieError> {
    let payload = token
        .and_then(|t| t.strip_prefix(SIGNED_PREFIX))
        .ok_or(CookieError::NotSigned)?;
    if secret.is_empty() {
        return Err(CookieError::MissingSecret);
    }

    let (value, sig_b64) = payload
        .rsplit_once('.')
        .ok_or(CookieError::SignatureMismatch)?;
    let provided = decode_sig(sig_b64).ok_or(CookieError::SignatureMismatch)?;
    let expected = hmac_sha256(secret.as_bytes(), value.as_bytes());

    if !bool::from(provided.ct_eq(&expected)) {
        tracing::debug!("Cookie signature mismatch");
        return Err(CookieError::SignatureMismatch);
    }

    Ok(value.to_string())
}

fn decode_sig(raw: &str) -> Option<[u8; HMAC_SHA256_SIG_LEN]> {
    if raw.len() != HMAC_SHA256_SIG_B64_LEN {
        return None;
    }
    let mut out = [0u8; HMAC_SHA256_SIG_LEN];
    let n = general_purpose::URL_SAFE_NO_PAD.decode_slice(raw, &mut out).ok()?;
    (n == HMAC_SHA256_SIG_LEN).then_some(out)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; HMAC_SHA256_SIG_LEN] {
    // RFC 2104.
    const BLOCK_LEN: usize = 64;
    let mut key_block = [0u8; BLOCK_LEN];
    if key.len() > BLOCK_LEN {
        let digest = Sha256::digest(key);
        key_block[..digest.len()].copy_from_slice(&digest);
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }

    let mut ipad = [0u8; BLOCK_LEN];
    let mut opad = [0u8; BLOCK_LEN];
    for i in 0..BLOCK_LEN {
        ipad[i] = key_block[i] ^ 0x36;
        opad[i] = key_block[i] ^ 0x5c;
    }

    let mut inner = Sha256::new();
    inner.update(ipad);
    inner.update(data);
    let inner_hash = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(opad);
    outer.update(inner_hash);

    let mut out = [0u8; HMAC_SHA256_SIG_LEN];
    out.copy_from_slice(&outer.finalize());
    out
}
