//! Principals and push-channel tokens
//!
//! Tenant identity lives outside this process; requests arrive with an
//! opaque bearer key that resolves to a `Principal`. The push channel
//! additionally supports one-shot exchange tokens with a short TTL for
//! clients that must not embed a long-lived API key (browser consoles).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

/// Whoever a request acts on behalf of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub tenant_id: String,
}

/// Bearer-key resolution seam
pub trait TenantDirectory: Send + Sync {
    fn resolve(&self, token: &str) -> Option<Principal>;
}

/// Directory backed by a fixed key set handed in at startup
pub struct StaticTenantDirectory {
    /// api key -> tenant id
    keys: HashMap<String, String>,
}

impl StaticTenantDirectory {
    pub fn new(pairs: &[(String, String)]) -> Self {
        Self {
            keys: pairs
                .iter()
                .map(|(tenant, key)| (key.clone(), tenant.clone()))
                .collect(),
        }
    }
}

impl TenantDirectory for StaticTenantDirectory {
    fn resolve(&self, token: &str) -> Option<Principal> {
        self.keys.get(token).map(|tenant_id| Principal {
            tenant_id: tenant_id.clone(),
        })
    }
}

/// Default lifetime of a one-shot push-channel token
pub const WS_TOKEN_TTL_SECS: i64 = 60;

/// One-shot exchange tokens, hashed at rest, consumed on first use.
pub struct TokenStore {
    ttl: ChronoDuration,
    entries: Mutex<HashMap<String, (Principal, DateTime<Utc>)>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            ttl: ChronoDuration::seconds(WS_TOKEN_TTL_SECS),
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    fn with_ttl(ttl: ChronoDuration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Mint a fresh token for a principal. Only the hash is retained.
    pub fn mint(&self, principal: &Principal) -> String {
        let token = random_token();
        let expires = Utc::now() + self.ttl;
        let mut entries = self.entries.lock().unwrap();
        sweep(&mut entries);
        entries.insert(hash_token(&token), (principal.clone(), expires));
        token
    }

    /// Redeem a token. Each token works exactly once and only before its
    /// expiry.
    pub fn consume(&self, token: &str) -> Option<Principal> {
        let mut entries = self.entries.lock().unwrap();
        sweep(&mut entries);
        let (principal, expires) = entries.remove(&hash_token(token))?;
        if expires < Utc::now() {
            return None;
        }
        Some(principal)
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sweep(entries: &mut HashMap<String, (Principal, DateTime<Utc>)>) {
    let now = Utc::now();
    entries.retain(|_, (_, expires)| *expires >= now);
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn random_token() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..40)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> Principal {
        Principal {
            tenant_id: "acme".to_string(),
        }
    }

    #[test]
    fn static_directory_resolves_keys() {
        let directory = StaticTenantDirectory::new(&[
            ("acme".to_string(), "key-1".to_string()),
            ("globex".to_string(), "key-2".to_string()),
        ]);

        assert_eq!(directory.resolve("key-1"), Some(acme()));
        assert_eq!(
            directory.resolve("key-2").unwrap().tenant_id,
            "globex".to_string()
        );
        assert_eq!(directory.resolve("nope"), None);
    }

    #[test]
    fn tokens_are_single_use() {
        let store = TokenStore::new();
        let token = store.mint(&acme());

        assert_eq!(store.consume(&token), Some(acme()));
        assert_eq!(store.consume(&token), None);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let store = TokenStore::with_ttl(ChronoDuration::seconds(-1));
        let token = store.mint(&acme());
        assert_eq!(store.consume(&token), None);
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let store = TokenStore::new();
        store.mint(&acme());
        assert_eq!(store.consume("forged"), None);
    }

    #[test]
    fn tokens_are_not_stored_in_the_clear() {
        let store = TokenStore::new();
        let token = store.mint(&acme());
        let entries = store.entries.lock().unwrap();
        assert!(!entries.contains_key(&token));
        assert!(entries.contains_key(&hash_token(&token)));
    }
}
