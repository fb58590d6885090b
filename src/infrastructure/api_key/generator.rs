//! API Key generation
//!
//! Generates cryptographically secure API keys, derives their display prefix and
//! lookup hash, and rejects malformed candidates before any storage round trip.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::domain::DomainError;

type HmacSha256 = Hmac<Sha256>;

/// Default prefix for issued keys
pub const DEFAULT_KEY_PREFIX: &str = "kg_live_";

/// Random characters kept in the display prefix
const DISPLAY_CHARS: usize = 8;

/// Result of generating a new API key
#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    /// The full API key (only shown once at creation)
    pub key: String,
    /// Non-secret prefix for display and search
    pub prefix: String,
    /// Lookup hash for storage
    pub hash: String,
}

/// Generator and validator for API keys
#[derive(Clone)]
pub struct ApiKeyGenerator {
    /// Prefix for all generated keys (e.g., "kg_live_", "kg_test_")
    prefix: String,
    /// Number of random bytes to generate
    key_bytes: usize,
    format: Regex,
    /// Keyed hasher; plain SHA-256 when absent
    mac: Option<HmacSha256>,
}

impl std::fmt::Debug for ApiKeyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyGenerator")
            .field("prefix", &self.prefix)
            .field("key_bytes", &self.key_bytes)
            .field("keyed", &self.mac.is_some())
            .finish()
    }
}

impl ApiKeyGenerator {
    /// Create a generator issuing 32-byte keys under `prefix`
    pub fn new(prefix: impl Into<String>) -> Result<Self, DomainError> {
        Self::with_key_bytes(prefix, 32)
    }

    pub fn with_key_bytes(prefix: impl Into<String>, key_bytes: usize) -> Result<Self, DomainError> {
        let prefix = prefix.into();

        if prefix.is_empty()
            || !prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DomainError::configuration(format!(
                "Invalid API key prefix '{}'",
                prefix
            )));
        }

        if key_bytes < 16 {
            return Err(DomainError::configuration(
                "API keys need at least 16 random bytes",
            ));
        }

        let encoded_len = base64::encoded_len(key_bytes, false).ok_or_else(|| {
            DomainError::configuration(format!("Unsupported key size of {} bytes", key_bytes))
        })?;
        let format = Regex::new(&format!(
            "^{}[A-Za-z0-9_-]{{{}}}$",
            regex::escape(&prefix),
            encoded_len
        ))
        .map_err(|e| DomainError::configuration(format!("Invalid key pattern: {}", e)))?;

        Ok(Self {
            prefix,
            key_bytes,
            format,
            mac: None,
        })
    }

    /// Hash keys with HMAC-SHA256 under a server-side secret instead of plain SHA-256
    pub fn with_hash_secret(mut self, secret: &str) -> Result<Self, DomainError> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| DomainError::configuration(format!("Invalid hash secret: {}", e)))?;
        self.mac = Some(mac);
        Ok(self)
    }

    /// Generate a new API key
    pub fn generate(&self) -> GeneratedApiKey {
        let mut random_bytes = vec![0u8; self.key_bytes];
        rand::thread_rng().fill_bytes(&mut random_bytes);

        let encoded = URL_SAFE_NO_PAD.encode(&random_bytes);
        let key = format!("{}{}", self.prefix, encoded);
        let prefix = format!("{}{}", self.prefix, &encoded[..DISPLAY_CHARS]);
        let hash = self.hash(&key);

        GeneratedApiKey { key, prefix, hash }
    }

    /// Cheap shape check: configured prefix, url-safe charset and exact length
    pub fn validate_format(&self, candidate: &str) -> bool {
        self.format.is_match(candidate)
    }

    /// Deterministic lookup hash of a full key
    pub fn hash(&self, key: &str) -> String {
        match &self.mac {
            Some(mac) => {
                let mut mac = mac.clone();
                mac.update(key.as_bytes());
                format!("hmac-sha256${}", hex::encode(mac.finalize().into_bytes()))
            }
            None => {
                let mut hasher = Sha256::new();
                hasher.update(key.as_bytes());
                format!("sha256${}", hex::encode(hasher.finalize()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn generator() -> ApiKeyGenerator {
        ApiKeyGenerator::new(DEFAULT_KEY_PREFIX).unwrap()
    }

    #[test]
    fn test_generate_shape() {
        let generated = generator().generate();

        assert!(generated.key.starts_with("kg_live_"));
        assert_eq!(generated.key.len(), "kg_live_".len() + 43);
        assert_eq!(generated.prefix.len(), "kg_live_".len() + 8);
        assert!(generated.key.starts_with(&generated.prefix));
        assert!(generated.hash.starts_with("sha256$"));
        assert!(!generated.hash.contains(&generated.key));
    }

    #[test]
    fn test_generated_keys_pass_format_check() {
        let generator = generator();
        for _ in 0..50 {
            assert!(generator.validate_format(&generator.generate().key));
        }
    }

    #[test]
    fn test_validate_format_rejects_malformed() {
        let generator = generator();
        let valid = generator.generate().key;

        assert!(!generator.validate_format(""));
        assert!(!generator.validate_format("kg_live_"));
        assert!(!generator.validate_format(&valid[..valid.len() - 1]));
        assert!(!generator.validate_format(&format!("{}A", valid)));
        assert!(!generator.validate_format(&valid.replace("kg_live_", "kg_test_")));
        assert!(!generator.validate_format(&format!("kg_live_{}", "+".repeat(43))));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let generator = generator();
        let key = generator.generate().key;

        assert_eq!(generator.hash(&key), generator.hash(&key));
        assert_eq!(generator.hash(&key), generator.clone().hash(&key));
    }

    #[test]
    fn test_distinct_keys_have_distinct_hashes() {
        let generator = generator();
        let mut keys = HashSet::new();
        let mut hashes = HashSet::new();

        for _ in 0..1000 {
            let generated = generator.generate();
            assert!(keys.insert(generated.key));
            assert!(hashes.insert(generated.hash));
        }
    }

    #[test]
    fn test_keyed_hash_differs_from_plain() {
        let plain = generator();
        let keyed = generator().with_hash_secret("pepper").unwrap();
        let other = generator().with_hash_secret("other-pepper").unwrap();
        let key = plain.generate().key;

        let hashed = keyed.hash(&key);
        assert!(hashed.starts_with("hmac-sha256$"));
        assert_ne!(hashed, plain.hash(&key));
        assert_ne!(hashed, other.hash(&key));
        assert_eq!(hashed, keyed.hash(&key));
    }

    #[test]
    fn test_known_sha256_digest() {
        assert_eq!(
            generator().hash("abc"),
            "sha256$ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(ApiKeyGenerator::new("").is_err());
        assert!(ApiKeyGenerator::new("kg live").is_err());
        assert!(ApiKeyGenerator::with_key_bytes("kg_", 8).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let keyed = generator().with_hash_secret("super-secret-pepper").unwrap();
        let debug = format!("{:?}", keyed);
        assert!(!debug.contains("super-secret-pepper"));
        assert!(debug.contains("keyed: true"));
    }
}
