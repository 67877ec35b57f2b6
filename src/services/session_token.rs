//! Random session tokens and their HMAC-signed cookie form (`<token>.<signature>`).

use argon2::password_hash::rand_core::{OsRng, RngCore};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::domain::errors::{AuthError, AuthResult};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_BYTES: usize = 32;

/// A fresh url-safe random token
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn mac(secret: &str) -> AuthResult<HmacSha256> {
    // HMAC accepts keys of any length
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::MissingSecret)
}

/// Append the signature of `token` under `secret`
pub fn sign(secret: &str, token: &str) -> AuthResult<String> {
    let mut mac = mac(secret)?;
    mac.update(token.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{}.{}", token, signature))
}

/// The token inside a signed value, or `None` when the signature does not match
pub fn verify(secret: &str, signed: &str) -> AuthResult<Option<String>> {
    let Some((token, signature)) = signed.rsplit_once('.') else {
        return Ok(None);
    };
    let Ok(signature) = URL_SAFE_NO_PAD.decode(signature) else {
        return Ok(None);
    };

    let mut mac = mac(secret)?;
    mac.update(token.as_bytes());
    match mac.verify_slice(&signature) {
        Ok(()) => Ok(Some(token.to_string())),
        Err(_) => Ok(None),
    }
}
