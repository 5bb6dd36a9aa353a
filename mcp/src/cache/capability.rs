//! Signed retrieval capabilities.
//!
//! A capability is the triple (token, expires, sig) where
//! `sig = hex(HMAC-SHA256(secret, "{token}:{expires}"))`. Holding the exact
//! triple before `expires` is what grants access to one cached payload.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{McpError, McpResult};

type HmacSha256 = Hmac<Sha256>;

/// Random bytes per token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Fresh unguessable token, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn capability_url(base_url: &str, token: &str, expires: i64, signature: &str) -> String {
    format!(
        "{}/cache/{}?expires={}&sig={}",
        base_url.trim_end_matches('/'),
        token,
        expires,
        signature
    )
}

#[derive(Clone)]
pub struct CapabilitySigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for CapabilitySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilitySigner").finish_non_exhaustive()
    }
}

impl CapabilitySigner {
    pub fn new(secret: &[u8]) -> McpResult<Self> {
        if secret.is_empty() {
            return Err(McpError::Config("cache secret must not be empty".to_string()));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| McpError::Config(format!("invalid cache secret: {}", e)))?;
        Ok(Self { mac })
    }

    fn digest(&self, token: &str, expires: i64) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        mac.update(b":");
        mac.update(expires.to_string().as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    pub fn sign(&self, token: &str, expires: i64) -> String {
        hex::encode(self.digest(token, expires))
    }

    /// Constant-time check of a presented signature.
    pub fn verify(&self, token: &str, expires: i64, signature: &str) -> bool {
        let Ok(presented) = hex::decode(signature) else {
            return false;
        };
        let expected = self.digest(token, expires);
        expected.ct_eq(&presented).into()
    }
}
