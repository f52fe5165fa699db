use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use super::{AgentPayload, AgentPrompt, ReasoningAgent, WebSearch};

const SEARCH_TOOL: &str = "web_search";

/// Gemini `generateContent` client with a bounded web-search tool loop.
pub struct GeminiAgent {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    search: Arc<dyn WebSearch>,
    max_tool_rounds: usize,
}

impl GeminiAgent {
    pub fn new(
        client: Client,
        api_key: String,
        base_url: String,
        model: String,
        search: Arc<dyn WebSearch>,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            search,
            max_tool_rounds,
        }
    }

    async fn user_turn(&self, prompt: &AgentPrompt, payload: &AgentPayload) -> anyhow::Result<Value> {
        let text = match prompt.instructions {
            Some(instructions) => format!("{}\n\n{}", instructions.trim(), payload.query.trim()),
            None => payload.query.trim().to_string(),
        };
        let mut parts = vec![json!({ "text": text })];

        if let Some(attachment) = &payload.attachment {
            let bytes = tokio::fs::read(&attachment.path)
                .await
                .with_context(|| format!("failed to read {}", attachment.path.display()))?;
            info!(
                path = %attachment.path.display(),
                mime = attachment.media_type.mime(),
                size = bytes.len(),
                "attaching document"
            );
            parts.push(json!({
                "inline_data": {
                    "mime_type": attachment.media_type.mime(),
                    "data": STANDARD.encode(&bytes),
                }
            }));
        }

        Ok(json!({ "role": "user", "parts": parts }))
    }

    async fn generate(&self, body: &Value) -> anyhow::Result<Value> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(300).collect();
            return Err(anyhow!("model request failed: {status} {detail}"));
        }

        let response_json: Value = response.json().await?;
        candidate_content(&response_json)
    }

    async fn answer_calls(&self, calls: &[FunctionCall]) -> Value {
        let mut parts = Vec::with_capacity(calls.len());
        for call in calls {
            let response = if call.name != SEARCH_TOOL {
                json!({ "error": format!("unknown function '{}'", call.name) })
            } else {
                match self.search.search(&call.query).await {
                    Ok(hits) => json!({ "results": hits }),
                    Err(e) => {
                        warn!(query = %call.query, "web search failed: {}", e);
                        json!({ "error": e.to_string() })
                    }
                }
            };
            parts.push(json!({
                "functionResponse": { "name": call.name, "response": response }
            }));
        }
        json!({ "role": "user", "parts": parts })
    }
}

#[async_trait]
impl ReasoningAgent for GeminiAgent {
    async fn run(&self, prompt: &AgentPrompt, payload: AgentPayload) -> anyhow::Result<String> {
        info!(agent = prompt.name, model = %self.model, "calling reasoning service");
        let mut contents = vec![self.user_turn(prompt, &payload).await?];

        for round in 0..=self.max_tool_rounds {
            let allow_tools = round < self.max_tool_rounds;
            let body = request_body(prompt, &contents, allow_tools);
            let reply = self.generate(&body).await?;

            let calls = function_calls(&reply);
            if calls.is_empty() {
                let text = extract_text(&reply)?;
                info!(agent = prompt.name, rounds = round, chars = text.len(), "model answered");
                return Ok(text);
            }

            info!(agent = prompt.name, round, calls = calls.len(), "model requested web search");
            let answers = self.answer_calls(&calls).await;
            contents.push(reply);
            contents.push(answers);
        }

        Err(anyhow!(
            "model kept requesting tools after {} rounds",
            self.max_tool_rounds
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FunctionCall {
    name: String,
    query: String,
}

fn search_declaration() -> Value {
    json!({
        "name": SEARCH_TOOL,
        "description": "Search the web for current medical reference information, \
                        reference ranges, and dietary or lifestyle guidance.",
        "parameters": {
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        }
    })
}

fn request_body(prompt: &AgentPrompt, contents: &[Value], allow_tools: bool) -> Value {
    let mut body = json!({
        "system_instruction": { "parts": [{ "text": prompt.system.trim() }] },
        "contents": contents,
    });
    if allow_tools {
        body["tools"] = json!([{ "function_declarations": [search_declaration()] }]);
    }
    body
}

/// The first candidate's `content`, with the role the follow-up turn needs.
fn candidate_content(response: &Value) -> anyhow::Result<Value> {
    if let Some(reason) = response["promptFeedback"]["blockReason"].as_str() {
        return Err(anyhow!("request blocked by the model: {reason}"));
    }
    let mut content = response["candidates"][0]["content"].clone();
    if !content.is_object() {
        let finish = response["candidates"][0]["finishReason"]
            .as_str()
            .unwrap_or("unknown");
        return Err(anyhow!("model returned no content (finish reason: {finish})"));
    }
    if content.get("role").is_none() {
        content["role"] = json!("model");
    }
    Ok(content)
}

fn function_calls(content: &Value) -> Vec<FunctionCall> {
    content["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("functionCall"))
                .map(|call| FunctionCall {
                    name: call["name"].as_str().unwrap_or_default().to_string(),
                    query: call["args"]["query"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn extract_text(content: &Value) -> anyhow::Result<String> {
    let text = content["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(anyhow!("Invalid response format from model: no text parts"));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMPT: AgentPrompt = AgentPrompt {
        name: "test",
        system: "  You are a lab analyzer.  ",
        instructions: Some("Use headings."),
    };

    #[test]
    fn body_carries_system_instruction_and_optional_tools() {
        let contents = vec![json!({ "role": "user", "parts": [{ "text": "hi" }] })];

        let with_tools = request_body(&PROMPT, &contents, true);
        assert_eq!(
            with_tools["system_instruction"]["parts"][0]["text"],
            "You are a lab analyzer."
        );
        assert_eq!(
            with_tools["tools"][0]["function_declarations"][0]["name"],
            SEARCH_TOOL
        );

        let without = request_body(&PROMPT, &contents, false);
        assert!(without.get("tools").is_none());
        assert_eq!(without["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn parses_function_calls_and_text() {
        let content = json!({
            "role": "model",
            "parts": [
                { "functionCall": { "name": "web_search", "args": { "query": "ferritin low" } } },
                { "text": "ignored while searching" }
            ]
        });
        assert_eq!(
            function_calls(&content),
            vec![FunctionCall {
                name: "web_search".into(),
                query: "ferritin low".into()
            }]
        );

        let answer = json!({ "parts": [{ "text": "**Test Summary:**" }, { "text": "\n- TSH 5.1 HIGH" }] });
        assert!(function_calls(&answer).is_empty());
        assert_eq!(extract_text(&answer).unwrap(), "**Test Summary:**\n- TSH 5.1 HIGH");
    }

    #[test]
    fn empty_or_blocked_responses_are_errors() {
        assert!(extract_text(&json!({ "parts": [] })).is_err());

        let blocked = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = candidate_content(&blocked).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));

        let truncated = json!({ "candidates": [{ "finishReason": "MAX_TOKENS" }] });
        assert!(candidate_content(&truncated).unwrap_err().to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn candidate_content_defaults_role_to_model() {
        let response = json!({ "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }] });
        assert_eq!(candidate_content(&response).unwrap()["role"], "model");
    }
}
