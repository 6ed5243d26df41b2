use crate::error::SignatureError;
use hmac::{Hmac, Mac};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

pub fn sign_sha512_hex(secret: &str, payload: &[u8]) -> String {
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks a hex HMAC-SHA512 header. An empty secret never verifies.
pub fn verify_sha512_hex(
    secret: &str,
    payload: &[u8],
    signature: Option<&str>,
) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::MissingSignature)?;
    let provided = hex::decode(signature).map_err(|_| SignatureError::Mismatch)?;

    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::MissingSecret)?;
    mac.update(payload);
    mac.verify_slice(&provided).map_err(|_| SignatureError::Mismatch)
}

/// Compares a shared-secret header against the configured value without early exit.
pub fn verify_shared_secret(secret: &str, signature: Option<&str>) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }
    let signature = signature
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::MissingSignature)?;
    if constant_time_eq(secret.as_bytes(), signature.as_bytes()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.iter().zip(b) {
        res |= x ^ y;
    }
    res == 0
}
