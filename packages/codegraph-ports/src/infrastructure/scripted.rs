//! Rule-driven `CompletionPort` adapter
//!
//! Rules are `(needle, response)` pairs checked in registration order against
//! the user prompt; the first rule whose needle occurs wins. Prompts matching
//! no rule get the default response.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::CompletionPort;
use crate::error::PortError;
use crate::Result;

/// One recorded `complete` invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionCall {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

enum Reply {
    Text(String),
    Fail(String),
}

pub struct ScriptedCompletion {
    rules: Vec<(String, Reply)>,
    default_response: String,
    calls: Mutex<Vec<CompletionCall>>,
}

impl ScriptedCompletion {
    pub fn new(default_response: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default_response: default_response.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer `response` when the user prompt contains `needle`.
    pub fn respond_when(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules
            .push((needle.into(), Reply::Text(response.into())));
        self
    }

    /// Fail with a completion error when the user prompt contains `needle`.
    pub fn fail_when(mut self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Fail(message.into())));
        self
    }

    pub fn calls(&self) -> Vec<CompletionCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl CompletionPort for ScriptedCompletion {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        self.calls.lock().push(CompletionCall {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            temperature,
            max_tokens,
        });

        let rule = self
            .rules
            .iter()
            .find(|(needle, _)| user_prompt.contains(needle.as_str()));

        match rule {
            Some((_, Reply::Text(text))) => Ok(text.clone()),
            Some((_, Reply::Fail(message))) => Err(PortError::completion(message.clone())),
            None => Ok(self.default_response.clone()),
        }
    }
}
