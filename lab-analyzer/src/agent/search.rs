use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Web search capability the model may call while answering.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>>;
}

/// Tavily search API client.
pub struct TavilySearch {
    client: Client,
    api_key: String,
    base_url: String,
    max_results: usize,
}

impl TavilySearch {
    pub fn new(client: Client, api_key: String, base_url: String, max_results: usize) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_results,
        }
    }
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>> {
        info!(query, "web search");

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "query": query,
                "max_results": self.max_results,
                "search_depth": "basic",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("search request failed: {}", response.status()));
        }

        let body: TavilyResponse = response.json().await?;
        let hits = body
            .results
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                content: r.content,
            })
            .collect::<Vec<_>>();

        info!(query, hits = hits.len(), "web search completed");
        Ok(hits)
    }
}
