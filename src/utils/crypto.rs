use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hex encoded SHA-256 digest of a raw token.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compares a stored digest with the digest of `token` in constant time.
pub fn digest_matches(stored_digest: &str, token: &str) -> bool {
    stored_digest
        .as_bytes()
        .ct_eq(hash_token(token).as_bytes())
        .into()
}

/// URL safe random string carrying `bytes` bytes of entropy.
pub fn random_string(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}
