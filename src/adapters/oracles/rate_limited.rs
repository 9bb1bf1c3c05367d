//! Client-side rate limiting for oracle calls.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::domain::ports::{ChatMessage, LlmOracle, OracleError, OracleResponse};

/// Wraps an oracle so that at most `requests_per_minute` calls start per
/// minute. Callers wait for capacity instead of failing.
pub struct RateLimitedOracle {
    inner: Arc<dyn LlmOracle>,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RateLimitedOracle {
    pub fn new(inner: Arc<dyn LlmOracle>, requests_per_minute: NonZeroU32) -> Self {
        Self {
            inner,
            limiter: RateLimiter::direct(Quota::per_minute(requests_per_minute)),
        }
    }
}

#[async_trait]
impl LlmOracle for RateLimitedOracle {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<OracleResponse, OracleError> {
        self.limiter.until_ready().await;
        self.inner.send(messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::oracles::ScriptedOracle;
    use std::time::Duration;

    #[tokio::test]
    async fn test_burst_within_quota_passes_through() {
        let inner = Arc::new(ScriptedOracle::new(vec![Ok("a".to_string()), Ok("b".to_string())]));
        let oracle = RateLimitedOracle::new(inner.clone(), NonZeroU32::new(60).unwrap());

        assert_eq!(oracle.send(&[ChatMessage::user("1")]).await.unwrap().content, "a");
        assert_eq!(oracle.send(&[ChatMessage::user("2")]).await.unwrap().content, "b");
        assert_eq!(inner.calls(), 2);
        assert_eq!(oracle.name(), "scripted");
    }

    #[tokio::test]
    async fn test_call_beyond_quota_waits() {
        let inner = Arc::new(ScriptedOracle::new(vec![Ok("a".to_string()), Ok("b".to_string())]));
        let oracle = RateLimitedOracle::new(inner, NonZeroU32::new(1).unwrap());

        oracle.send(&[ChatMessage::user("1")]).await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(100), oracle.send(&[ChatMessage::user("2")])).await;
        assert!(second.is_err(), "second call should still be waiting for capacity");
    }
}
