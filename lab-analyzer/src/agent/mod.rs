//! Boundary to the hosted reasoning service.
//!
//! Orchestrators only see [`ReasoningAgent`]; the live implementation talks
//! to Gemini and lets it call web search, the stub replays scripted answers.

pub mod gemini;
pub mod search;
pub mod stub;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::models::MediaType;

pub use gemini::GeminiAgent;
pub use search::{SearchHit, TavilySearch, WebSearch};
pub use stub::StubAgent;

/// Fixed prompt material for one kind of call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentPrompt {
    /// Stable name used in logs and by the stub to pick a script
    pub name: &'static str,
    pub system: &'static str,
    pub instructions: Option<&'static str>,
}

/// A file handed to the model alongside the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub path: PathBuf,
    pub media_type: MediaType,
}

/// Dynamic part of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPayload {
    pub query: String,
    pub attachment: Option<Attachment>,
}

impl AgentPayload {
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(query: impl Into<String>, attachment: Attachment) -> Self {
        Self {
            query: query.into(),
            attachment: Some(attachment),
        }
    }
}

#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    /// One blocking round trip; returns the model's text verbatim.
    async fn run(&self, prompt: &AgentPrompt, payload: AgentPayload) -> anyhow::Result<String>;
}
