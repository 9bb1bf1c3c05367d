//! Scripted oracle for tests and offline runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::ports::{ChatMessage, LlmOracle, OracleError, OracleResponse, TokenUsage};

/// One scripted reply: response content, or a transport error message.
pub type ScriptedReply = Result<String, String>;

/// Oracle that replays a fixed list of replies in order and records every
/// conversation it receives. Runs out as a network error.
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<ScriptedReply>>,
    received: Mutex<Vec<Vec<ChatMessage>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    tokens_per_call: u64,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            received: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
            tokens_per_call: 100,
        }
    }

    /// Sleep before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Conversations received so far.
    pub fn received(&self) -> Vec<Vec<ChatMessage>> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmOracle for ScriptedOracle {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<OracleResponse, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut received) = self.received.lock() {
            received.push(messages.to_vec());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .replies
            .lock()
            .map_err(|_| OracleError::Network("scripted oracle poisoned".to_string()))?
            .pop_front();

        match next {
            Some(Ok(content)) => Ok(OracleResponse {
                content,
                usage: TokenUsage::new(self.tokens_per_call * 4 / 5, self.tokens_per_call / 5),
                model: self.model().to_string(),
                provider: self.name().to_string(),
            }),
            Some(Err(message)) => Err(OracleError::Network(message)),
            None => Err(OracleError::Network("no scripted reply left".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_then_fails() {
        let oracle = ScriptedOracle::new(vec![Ok("first".to_string()), Err("boom".to_string())]);

        let first = oracle.send(&[ChatMessage::user("a")]).await.unwrap();
        assert_eq!(first.content, "first");
        assert_eq!(first.usage.total, 100);
        assert!(matches!(oracle.send(&[]).await, Err(OracleError::Network(m)) if m == "boom"));
        assert!(oracle.send(&[]).await.is_err());
        assert_eq!(oracle.calls(), 3);
        assert_eq!(oracle.received()[0][0].content, "a");
    }
}
