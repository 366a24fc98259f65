//! HMAC signature verification over the raw request body.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;
use thiserror::Error;

use hookline_relay_db::entities::endpoint_settings;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Headers checked for a signature, in order of precedence.
const SIGNATURE_HEADERS: [&str; 4] = [
    "x-signature",
    "x-hub-signature-256",
    "x-stripe-signature",
    "signature",
];

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("no signature header found")]
    MissingHeader,

    #[error("signature mismatch")]
    Mismatch,
}

/// Verify the request signature against the endpoint's settings. Passes
/// when no secret is configured; fails when a secret is configured and the
/// signature header is missing or its digest does not match.
pub fn verify_signature(
    settings: &endpoint_settings::Model,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), SignatureError> {
    let secret = match settings.hmac_secret.as_deref() {
        Some(secret) if !secret.is_empty() => secret,
        _ => return Ok(()),
    };

    let provided = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok())
        .ok_or(SignatureError::MissingHeader)?;

    let provided = strip_algorithm_prefix(provided, &settings.hmac_algorithm);
    let expected = compute_digest(&settings.hmac_algorithm, secret, body);

    // Constant-time comparison over the hex-encoded digests.
    if bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Remove a leading `<algo>=` marker, e.g. `sha256=<hex>`.
fn strip_algorithm_prefix<'a>(signature: &'a str, algorithm: &str) -> &'a str {
    let mut signature = signature;
    if let Some(rest) = signature
        .strip_prefix(algorithm)
        .and_then(|rest| rest.strip_prefix('='))
    {
        signature = rest;
    }
    for known in ["sha256=", "sha1=", "sha512="] {
        if let Some(rest) = signature.strip_prefix(known) {
            signature = rest;
        }
    }
    signature
}

fn compute_digest(algorithm: &str, secret: &str, body: &[u8]) -> String {
    match algorithm {
        "sha1" => {
            let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
                .expect("HMAC accepts keys of any length");
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
        "sha512" => {
            let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
                .expect("HMAC accepts keys of any length");
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
        _ => {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .expect("HMAC accepts keys of any length");
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
    }
}
