//! Language model capability.
//!
//! The whole library talks to models through [`LanguageModel`]: one system
//! instruction and one user instruction in, free-form text out. Nothing about
//! the answer is trusted; structure is recovered afterwards by the response
//! extractor. Implementations:
//!
//! - [`ChatModel`] calls a hosted provider over HTTP.
//! - [`ScriptedModel`] replays canned answers and records what it was asked.

pub mod chat;
pub mod scripted;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

pub use chat::ChatModel;
pub use scripted::{ModelCall, ScriptedModel};

/// A text-in, text-out language model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send one system + user instruction pair and return the answer text
    async fn generate(&self, system: &str, user: &str) -> Result<String>;
}

/// Issue one model call that fails with [`Error::Timeout`] after `timeout`.
pub async fn call_with_timeout(
    model: &dyn LanguageModel,
    timeout: Duration,
    system: &str,
    user: &str,
) -> Result<String> {
    log::debug!(
        "Model call: system {} bytes, user {} bytes",
        system.len(),
        user.len()
    );
    match tokio::time::timeout(timeout, model.generate(system, user)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    #[tokio::test]
    async fn test_call_with_timeout_expires() {
        let result = call_with_timeout(&SlowModel, Duration::from_millis(20), "s", "u").await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_call_with_timeout_passes_answer_through() -> Result<()> {
        let model = ScriptedModel::new(["hello"]);
        let answer = call_with_timeout(&model, Duration::from_secs(1), "s", "u").await?;
        assert_eq!(answer, "hello");
        Ok(())
    }
}
