//! PKCE (RFC 7636) helpers and CSRF state token generation.
//!
//! X requires PKCE on every authorization; the other platforms get the same
//! state-token treatment without a challenge.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Verifier plus its S256 challenge for one authorization round trip.
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// Random string kept server-side until the token exchange.
    pub verifier: String,
    /// BASE64URL(SHA256(verifier)), sent in the authorization request.
    pub challenge: String,
}

/// Generate a code verifier and its matching S256 challenge.
///
/// The verifier is 32 random bytes, URL-safe base64 without padding
/// (43 characters, within the 43-128 range RFC 7636 requires).
pub fn generate_pkce_pair() -> PkcePair {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let verifier = base64_url::encode(&bytes);
    let challenge = code_challenge(&verifier);
    PkcePair { verifier, challenge }
}

/// Compute the S256 challenge for a verifier.
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64_url::encode(&digest)
}

/// Generate a random state token for CSRF protection (32 bytes, base64url).
pub fn generate_state_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64_url::encode(&bytes)
}
