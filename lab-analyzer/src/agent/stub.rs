use anyhow::anyhow;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{AgentPayload, AgentPrompt, ReasoningAgent};

/// Scripted agent for offline runs and tests.
///
/// Replies are queued per prompt name; an empty queue fails the call like a
/// network error would. Every call is recorded.
#[derive(Default)]
pub struct StubAgent {
    scripts: DashMap<&'static str, VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<(&'static str, AgentPayload)>>,
}

impl StubAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, prompt_name: &'static str, text: impl Into<String>) -> Self {
        self.scripts
            .entry(prompt_name)
            .or_default()
            .push_back(Ok(text.into()));
        self
    }

    pub fn fail(self, prompt_name: &'static str, message: impl Into<String>) -> Self {
        self.scripts
            .entry(prompt_name)
            .or_default()
            .push_back(Err(message.into()));
        self
    }

    pub fn call_count(&self, prompt_name: &str) -> usize {
        self.calls()
            .iter()
            .filter(|(name, _)| *name == prompt_name)
            .count()
    }

    pub fn calls(&self) -> Vec<(&'static str, AgentPayload)> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningAgent for StubAgent {
    async fn run(&self, prompt: &AgentPrompt, payload: AgentPayload) -> anyhow::Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((prompt.name, payload));
        }
        let next = self
            .scripts
            .get_mut(prompt.name)
            .and_then(|mut queue| queue.pop_front());
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply for '{}'", prompt.name)),
        }
    }
}
