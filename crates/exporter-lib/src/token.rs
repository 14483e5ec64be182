//! Bearer token cache with probe-before-reuse validation
//!
//! The engine gives no reliable expiry for SSO tokens and may revoke them at
//! any time (engine restart, session cleanup). Instead of tracking expiry the
//! cache probes the cached token on every acquisition and re-authenticates
//! only when the probe is answered with 401.
//!
//! Token installation is serialized through a single-flight lock: when
//! several callers find the token missing or rejected at the same time, the
//! first performs the credential exchange and the others reuse its result.

use crate::error::Result;
use crate::models::Token;
use crate::observability::{ExporterMetrics, StructuredLogger};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

/// Result of probing a cached token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Anything other than 401; the token is still usable
    Accepted,
    /// The engine answered 401; re-authentication is required
    Rejected,
}

/// Credential operations the cache depends on
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Test whether `token` is still accepted by the engine
    async fn probe(&self, token: &Token) -> Result<ProbeOutcome>;

    /// Exchange the configured credentials for a fresh token
    async fn exchange(&self) -> Result<Token>;
}

#[derive(Debug, Default)]
struct TokenSlot {
    token: Option<Token>,
    /// Bumped on every installation or invalidation
    generation: u64,
}

/// Lazily validated, race-safe token cache
pub struct TokenCache {
    authenticator: Arc<dyn Authenticator>,
    slot: RwLock<TokenSlot>,
    refresh_lock: Mutex<()>,
    metrics: ExporterMetrics,
    logger: Option<StructuredLogger>,
}

impl TokenCache {
    /// Create an empty cache; the first `acquire` performs an exchange
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            authenticator,
            slot: RwLock::new(TokenSlot::default()),
            refresh_lock: Mutex::new(()),
            metrics: ExporterMetrics::new(),
            logger: None,
        }
    }

    /// Attach a structured logger for token refresh events
    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Return a token the engine currently accepts
    pub async fn acquire(&self) -> Result<Token> {
        let (cached, generation) = self.current();

        let reason = match cached {
            Some(token) => {
                let outcome = self.authenticator.probe(&token).await?;
                self.metrics.inc_token_probe(outcome);

                if outcome == ProbeOutcome::Accepted {
                    return Ok(token);
                }

                debug!(generation, "Cached token rejected by engine");
                "rejected"
            }
            None => "missing",
        };

        self.refresh(generation, reason).await
    }

    /// Whether a token is currently cached (validity unknown)
    #[cfg(test)]
    pub(crate) fn has_token(&self) -> bool {
        self.current().0.is_some()
    }

    /// Drop the cached token so the next `acquire` re-authenticates
    pub fn invalidate(&self) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        slot.token = None;
        slot.generation += 1;
    }

    fn current(&self) -> (Option<Token>, u64) {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        (slot.token.clone(), slot.generation)
    }

    /// Exchange credentials unless another caller already installed a token
    /// newer than the generation we found missing or stale.
    async fn refresh(&self, observed: u64, reason: &str) -> Result<Token> {
        let _guard = self.refresh_lock.lock().await;

        if let (Some(token), generation) = self.current() {
            if generation != observed {
                debug!(generation, "Token refreshed by a concurrent caller");
                return Ok(token);
            }
        }

        let token = self.authenticator.exchange().await?;
        self.metrics.inc_token_exchanges();

        let generation = {
            let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
            slot.generation += 1;
            slot.token = Some(token.clone());
            slot.generation
        };

        if let Some(logger) = &self.logger {
            logger.log_token_refresh(reason, generation);
        }

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExporterError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Authenticator whose probe verdict can be flipped by the test
    struct MockAuthenticator {
        accept: AtomicBool,
        fail_exchange: AtomicBool,
        probes: AtomicUsize,
        exchanges: AtomicUsize,
        exchange_delay: Duration,
    }

    impl MockAuthenticator {
        fn new() -> Self {
            Self {
                accept: AtomicBool::new(true),
                fail_exchange: AtomicBool::new(false),
                probes: AtomicUsize::new(0),
                exchanges: AtomicUsize::new(0),
                exchange_delay: Duration::ZERO,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                exchange_delay: delay,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl Authenticator for MockAuthenticator {
        async fn probe(&self, _token: &Token) -> Result<ProbeOutcome> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.accept.load(Ordering::SeqCst) {
                Ok(ProbeOutcome::Accepted)
            } else {
                Ok(ProbeOutcome::Rejected)
            }
        }

        async fn exchange(&self) -> Result<Token> {
            let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.exchange_delay.is_zero() {
                tokio::time::sleep(self.exchange_delay).await;
            }
            if self.fail_exchange.load(Ordering::SeqCst) {
                return Err(ExporterError::AuthenticationFailed {
                    status: 401,
                    reason: "invalid_grant".to_string(),
                });
            }
            // Fresh tokens are accepted until the test says otherwise
            self.accept.store(true, Ordering::SeqCst);
            Ok(Token::new(format!("token-{n}")))
        }
    }

    #[tokio::test]
    async fn test_first_acquire_exchanges_without_probe() {
        let auth = Arc::new(MockAuthenticator::new());
        let cache = TokenCache::new(auth.clone());

        let token = cache.acquire().await.unwrap();

        assert_eq!(token.as_str(), "token-1");
        assert_eq!(auth.exchanges.load(Ordering::SeqCst), 1);
        assert_eq!(auth.probes.load(Ordering::SeqCst), 0);
        assert!(cache.has_token());
    }

    #[tokio::test]
    async fn test_accepted_probe_never_exchanges() {
        let auth = Arc::new(MockAuthenticator::new());
        let cache = TokenCache::new(auth.clone());

        cache.acquire().await.unwrap();
        for _ in 0..5 {
            let token = cache.acquire().await.unwrap();
            assert_eq!(token.as_str(), "token-1");
        }

        assert_eq!(auth.exchanges.load(Ordering::SeqCst), 1);
        assert_eq!(auth.probes.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_rejected_probe_exchanges_exactly_once() {
        let auth = Arc::new(MockAuthenticator::new());
        let cache = TokenCache::new(auth.clone());

        cache.acquire().await.unwrap();
        auth.accept.store(false, Ordering::SeqCst);

        let token = cache.acquire().await.unwrap();

        assert_eq!(token.as_str(), "token-2");
        assert_eq!(auth.exchanges.load(Ordering::SeqCst), 2);
        assert_eq!(auth.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_single_exchange() {
        let auth = Arc::new(MockAuthenticator::slow(Duration::from_millis(50)));
        let cache = Arc::new(TokenCache::new(auth.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.acquire().await }));
        }

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.as_str(), "token-1");
        }

        assert_eq!(auth.exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_rejection_single_exchange() {
        let auth = Arc::new(MockAuthenticator::slow(Duration::from_millis(50)));
        let cache = Arc::new(TokenCache::new(auth.clone()));
        cache.acquire().await.unwrap();
        auth.accept.store(false, Ordering::SeqCst);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.acquire().await }));
        }

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.as_str(), "token-2");
        }

        assert_eq!(auth.exchanges.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_exchange_propagates_and_keeps_nothing() {
        let auth = Arc::new(MockAuthenticator::new());
        auth.fail_exchange.store(true, Ordering::SeqCst);
        let cache = TokenCache::new(auth.clone());

        let err = cache.acquire().await.unwrap_err();

        assert_eq!(err.kind(), "authentication_failed");
        assert!(!cache.has_token());

        // Next call retries the exchange, there is no inline retry
        assert_eq!(auth.exchanges.load(Ordering::SeqCst), 1);
        auth.fail_exchange.store(false, Ordering::SeqCst);
        assert_eq!(cache.acquire().await.unwrap().as_str(), "token-2");
    }

    #[tokio::test]
    async fn test_invalidate_forces_exchange() {
        let auth = Arc::new(MockAuthenticator::new());
        let cache = TokenCache::new(auth.clone());

        cache.acquire().await.unwrap();
        cache.invalidate();
        assert!(!cache.has_token());

        let token = cache.acquire().await.unwrap();
        assert_eq!(token.as_str(), "token-2");
        assert_eq!(auth.probes.load(Ordering::SeqCst), 0);
    }
}
