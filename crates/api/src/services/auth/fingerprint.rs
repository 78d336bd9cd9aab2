//! Refresh-token fingerprinting.
//!
//! Refresh tokens are stored hashed, not raw: the server keeps an
//! HMAC-SHA256 of each issued token, keyed with the refresh signing secret.
//! Revocation and rotation work by set membership on the fingerprint, and a
//! leaked token table yields no usable bearer credentials.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the stored fingerprint of a raw refresh token.
///
/// Deterministic: the same raw token always maps to the same lowercase hex
/// digest, so a presented token can be matched against the stored set.
#[must_use]
pub fn fingerprint(raw_token: &str, refresh_secret: &SecretString) -> String {
    let mut mac = HmacSha256::new_from_slice(refresh_secret.expose_secret().as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(raw_token.as_bytes());

    hex::encode(mac.finalize().into_bytes())
}
