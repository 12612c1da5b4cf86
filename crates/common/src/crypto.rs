//! WireGuard key material
//!
//! Keys are opaque base64 strings everywhere outside this module. The
//! `KeyProvider` trait is the seam between the registry and whatever produces
//! keys; the daemon ships a `wg` CLI backed provider, this module ships the
//! in-process x25519 one.

use crate::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

/// Private, public and pre-shared key for a new peer
#[derive(Clone)]
pub struct KeyTriple {
    pub private_key: String,
    pub public_key: String,
    pub pre_shared_key: String,
}

impl std::fmt::Debug for KeyTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyTriple")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Source of WireGuard key material
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Generate a new private key
    async fn private_key(&self) -> Result<String>;

    /// Derive the public key for a private key
    async fn public_key(&self, private_key: &str) -> Result<String>;

    /// Generate a new pre-shared key
    async fn pre_shared_key(&self) -> Result<String>;

    /// Generate a full triple for a new peer
    async fn triple(&self) -> Result<KeyTriple> {
        let private_key = self.private_key().await?;
        let public_key = self.public_key(&private_key).await?;
        let pre_shared_key = self.pre_shared_key().await?;
        Ok(KeyTriple {
            private_key,
            public_key,
            pre_shared_key,
        })
    }
}

/// In-process x25519 key generation
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeKeyProvider;

#[async_trait]
impl KeyProvider for NativeKeyProvider {
    async fn private_key(&self) -> Result<String> {
        Ok(STANDARD.encode(generate_private_key_bytes()))
    }

    async fn public_key(&self, private_key: &str) -> Result<String> {
        derive_public_key(private_key)
    }

    async fn pre_shared_key(&self) -> Result<String> {
        let mut psk = [0u8; 32];
        OsRng.fill_bytes(&mut psk);
        Ok(STANDARD.encode(psk))
    }
}

fn generate_private_key_bytes() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);

    // curve25519 clamping, same as `wg genkey`
    bytes[0] &= 248;
    bytes[31] &= 127;
    bytes[31] |= 64;
    bytes
}

/// Derive a base64 public key from a base64 private key
pub fn derive_public_key(private_key: &str) -> Result<String> {
    let decoded = STANDARD
        .decode(private_key.trim())
        .map_err(|e| Error::Crypto(format!("Invalid private key encoding: {}", e)))?;
    let bytes: [u8; 32] = decoded
        .try_into()
        .map_err(|_| Error::Crypto("Invalid private key length".to_string()))?;

    let secret = StaticSecret::from(bytes);
    let public = PublicKey::from(&secret);
    Ok(STANDARD.encode(public.as_bytes()))
}

/// Random token for one-time download links
pub fn generate_link_token() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_triple_generation() {
        let triple = NativeKeyProvider.triple().await.unwrap();
        assert_eq!(triple.private_key.len(), 44); // Base64 of 32 bytes
        assert_eq!(triple.public_key.len(), 44);
        assert_eq!(triple.pre_shared_key.len(), 44);
        assert_ne!(triple.private_key, triple.public_key);
    }

    #[tokio::test]
    async fn test_public_key_is_deterministic() {
        let private = NativeKeyProvider.private_key().await.unwrap();
        let a = NativeKeyProvider.public_key(&private).await.unwrap();
        let b = derive_public_key(&private).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_private_key_is_clamped() {
        let bytes = generate_private_key_bytes();
        assert_eq!(bytes[0] & 7, 0);
        assert_eq!(bytes[31] & 128, 0);
        assert_eq!(bytes[31] & 64, 64);
    }

    #[test]
    fn test_rejects_malformed_private_key() {
        assert!(derive_public_key("not base64!").is_err());
        assert!(derive_public_key(&STANDARD.encode([1u8; 16])).is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let triple = KeyTriple {
            private_key: "PRIVATE".into(),
            public_key: "PUBLIC".into(),
            pre_shared_key: "PSK".into(),
        };
        let rendered = format!("{:?}", triple);
        assert!(rendered.contains("PUBLIC"));
        assert!(!rendered.contains("PRIVATE"));
        assert!(!rendered.contains("PSK"));
    }

    #[test]
    fn test_link_tokens_differ() {
        let a = generate_link_token();
        let b = generate_link_token();
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }
}
