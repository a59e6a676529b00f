//! Nonce service
//!
//! Action-scoped anti-forgery tokens for state-changing admin requests.
//!
//! A nonce is an HMAC-SHA256 over `action|session|tick`, truncated to a
//! short hex string. The tick advances every half lifetime, and verification
//! accepts the current and the previous tick, so a token stays valid for
//! between one half and one full lifetime. Nonces are not single-use; they
//! bind a request to a session and an action within a time window.

use crate::config::NonceConfig;
use anyhow::Result;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Number of hex characters kept from the HMAC output
const NONCE_LEN: usize = 10;

/// Nonce creation and verification
pub struct NonceService {
    secret: Vec<u8>,
    lifetime_seconds: u64,
}

impl NonceService {
    /// Create a nonce service from configuration.
    ///
    /// An empty configured secret is replaced with a random per-process
    /// secret, which invalidates all nonces on restart.
    pub fn new(config: &NonceConfig) -> Self {
        let secret = if config.secret.is_empty() {
            tracing::warn!("No nonce secret configured, using a random per-process secret");
            format!("{}{}", Uuid::new_v4(), Uuid::new_v4()).into_bytes()
        } else {
            config.secret.clone().into_bytes()
        };

        Self {
            secret,
            lifetime_seconds: config.lifetime_seconds,
        }
    }

    /// Create a nonce for an action bound to a session
    pub fn create(&self, action: &str, session_id: &str) -> Result<String> {
        self.nonce_at_tick(action, session_id, self.current_tick())
    }

    /// Verify a nonce for an action bound to a session.
    ///
    /// Accepts tokens minted in the current or the previous tick window.
    pub fn verify(&self, nonce: &str, action: &str, session_id: &str) -> bool {
        let tick = self.current_tick();

        for candidate_tick in [tick, tick.saturating_sub(1)] {
            match self.nonce_at_tick(action, session_id, candidate_tick) {
                Ok(expected) if constant_time_eq(expected.as_bytes(), nonce.as_bytes()) => {
                    return true;
                }
                _ => {}
            }
        }

        false
    }

    /// Tick counter advancing every half lifetime
    fn current_tick(&self) -> u64 {
        let now = Utc::now().timestamp().max(0) as u64;
        now / (self.lifetime_seconds / 2).max(1)
    }

    fn nonce_at_tick(&self, action: &str, session_id: &str, tick: u64) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| anyhow::anyhow!("Invalid HMAC key: {}", e))?;
        mac.update(format!("{}|{}|{}", action, session_id, tick).as_bytes());
        let digest = mac.finalize().into_bytes();

        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Ok(hex[..NONCE_LEN].to_string())
    }
}

/// Compare two byte slices without short-circuiting on the first mismatch
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> NonceService {
        NonceService::new(&NonceConfig {
            secret: "test-secret".to_string(),
            lifetime_seconds: 86400,
        })
    }

    #[test]
    fn test_valid_nonce_verifies() {
        let service = test_service();

        let nonce = service.create("eum_export", "session-1").expect("create failed");

        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(service.verify(&nonce, "eum_export", "session-1"));
    }

    #[test]
    fn test_nonce_bound_to_action() {
        let service = test_service();

        let nonce = service.create("eum_export", "session-1").expect("create failed");

        assert!(!service.verify(&nonce, "other_action", "session-1"));
    }

    #[test]
    fn test_nonce_bound_to_session() {
        let service = test_service();

        let nonce = service.create("eum_export", "session-1").expect("create failed");

        assert!(!service.verify(&nonce, "eum_export", "session-2"));
    }

    #[test]
    fn test_tampered_nonce_rejected() {
        let service = test_service();

        let nonce = service.create("eum_export", "session-1").expect("create failed");
        let mut tampered = nonce.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });

        assert!(!service.verify(&tampered, "eum_export", "session-1"));
        assert!(!service.verify("", "eum_export", "session-1"));
    }

    #[test]
    fn test_different_secrets_produce_incompatible_nonces() {
        let a = test_service();
        let b = NonceService::new(&NonceConfig {
            secret: "another-secret".to_string(),
            lifetime_seconds: 86400,
        });

        let nonce = a.create("eum_export", "session-1").expect("create failed");

        assert!(!b.verify(&nonce, "eum_export", "session-1"));
    }

    #[test]
    fn test_empty_secret_is_randomized_per_instance() {
        let config = NonceConfig {
            secret: String::new(),
            lifetime_seconds: 86400,
        };
        let a = NonceService::new(&config);
        let b = NonceService::new(&config);

        let nonce = a.create("eum_export", "session-1").expect("create failed");

        assert!(a.verify(&nonce, "eum_export", "session-1"));
        assert!(!b.verify(&nonce, "eum_export", "session-1"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
