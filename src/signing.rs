//! Shared-key signing for Azure services.
//!
//! Both IoT Hub SAS tokens and Blob Storage Shared Key headers are an
//! HMAC-SHA256 over a canonical string, keyed with a base64-encoded secret
//! and emitted as base64.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign `message` with a base64-encoded key; returns the base64 signature.
pub fn sign_base64_key(key_b64: &str, message: &str) -> Result<String> {
    let key = STANDARD
        .decode(key_b64.trim())
        .context("shared access key is not valid base64")?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| anyhow!("invalid shared access key: {}", e))?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Percent-encode a value for use in a query string or SAS resource.
pub fn url_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
