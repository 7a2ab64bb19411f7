//! A model that replays a fixed script of answers.
//!
//! Used for deterministic call-sequence tests and for offline dry runs. Every
//! request is recorded so callers can assert on call order and on the context
//! each call carried.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::LanguageModel;
use crate::error::{Error, Result};

/// One recorded request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCall {
    pub system: String,
    pub user: String,
}

/// Replays answers in order; running out of answers is a model error
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<ModelCall>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Append another answer to the script
    pub fn push(&self, response: impl Into<String>) {
        lock(&self.responses).push_back(response.into());
    }

    /// Every request received so far, in order
    pub fn calls(&self) -> Vec<ModelCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Answers not consumed yet
    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        lock(&self.calls).push(ModelCall {
            system: system.to_string(),
            user: user.to_string(),
        });
        lock(&self.responses).pop_front().ok_or_else(|| {
            Error::model(format!(
                "scripted model exhausted after {} calls",
                self.call_count()
            ))
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
