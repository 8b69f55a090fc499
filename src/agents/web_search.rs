//! Web search agent
//!
//! Answers lookup-style questions via configurable search providers
//! (Brave, Serper) and summarizes the top hits into a spoken reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agents::Agent;
use crate::session::TurnId;
use crate::{Error, Result};

const KEYWORDS: &[&str] = &[
    "search", "look up", "google", "what is", "who is", "when did", "latest", "news", "weather",
];

/// How many results feed the spoken summary
const RESULT_LIMIT: usize = 3;

/// Search provider configuration
#[derive(Debug, Clone)]
pub enum SearchProvider {
    /// Brave Search API
    Brave {
        /// API key for Brave Search
        api_key: String,
    },
    /// Serper (Google) Search API
    Serper {
        /// API key for Serper
        api_key: String,
    },
}

/// Search result from web search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title
    pub title: String,
    /// Result URL
    pub url: String,
    /// Result snippet/description
    pub snippet: String,
}

/// Brave Search API response
#[derive(Debug, Deserialize)]
struct BraveSearchResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    description: String,
}

/// Serper API response
#[derive(Debug, Deserialize)]
struct SerperSearchResponse {
    organic: Option<Vec<SerperResult>>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    title: String,
    link: String,
    snippet: String,
}

/// Serper API request body
#[derive(Debug, Serialize)]
struct SerperRequest {
    q: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    num: Option<usize>,
}

/// Agent for web lookups
pub struct WebSearchAgent {
    provider: SearchProvider,
    client: reqwest::Client,
}

impl WebSearchAgent {
    /// Create an agent backed by Brave Search
    #[must_use]
    pub fn new_brave(api_key: String) -> Self {
        Self {
            provider: SearchProvider::Brave { api_key },
            client: reqwest::Client::new(),
        }
    }

    /// Create an agent backed by Serper
    #[must_use]
    pub fn new_serper(api_key: String) -> Self {
        Self {
            provider: SearchProvider::Serper { api_key },
            client: reqwest::Client::new(),
        }
    }

    /// Perform a web search
    ///
    /// # Errors
    ///
    /// Returns error if the search request fails or response parsing fails
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<SearchResult>> {
        match &self.provider {
            SearchProvider::Brave { api_key } => self.search_brave(api_key, query, limit).await,
            SearchProvider::Serper { api_key } => self.search_serper(api_key, query, limit).await,
        }
    }

    /// Search using Brave Search API
    async fn search_brave(
        &self,
        api_key: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let count = limit.unwrap_or(10);

        let response = self
            .client
            .get("https://api.search.brave.com/res/v1/web/search")
            .header("X-Subscription-Token", api_key)
            .query(&[("q", query), ("count", &count.to_string())])
            .send()
            .await?;

        let response = response.error_for_status().map_err(Error::Http)?;

        let brave_response: BraveSearchResponse = response.json().await?;

        let results = brave_response
            .web
            .map(|web| {
                web.results
                    .into_iter()
                    .map(|r| SearchResult {
                        title: r.title,
                        url: r.url,
                        snippet: r.description,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(results)
    }

    /// Search using Serper API
    async fn search_serper(
        &self,
        api_key: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let request_body = SerperRequest {
            q: query.to_string(),
            num: limit,
        };

        let response = self
            .client
            .post("https://google.serper.dev/search")
            .header("X-API-KEY", api_key)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let response = response.error_for_status().map_err(Error::Http)?;

        let serper_response: SerperSearchResponse = response.json().await?;

        let results = serper_response
            .organic
            .map(|organic| {
                organic
                    .into_iter()
                    .map(|r| SearchResult {
                        title: r.title,
                        url: r.link,
                        snippet: r.snippet,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(results)
    }
}

/// Strip lead-in phrasing so the provider sees the actual query
fn normalize_query(text: &str) -> String {
    let lower = text.trim().to_lowercase();
    for prefix in ["search for", "search", "look up", "google", "find out"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            let rest = rest.trim();
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    lower
}

/// Condense results into something speakable
fn summarize(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("I couldn't find anything about {query}.");
    }

    let mut reply = format!("Here's what I found about {query}. ");
    for result in results.iter().take(RESULT_LIMIT) {
        let snippet = if result.snippet.is_empty() {
            result.title.clone()
        } else {
            result.snippet.clone()
        };
        reply.push_str(&snippet);
        if !snippet.ends_with('.') {
            reply.push('.');
        }
        reply.push(' ');
    }
    reply.trim_end().to_string()
}

#[async_trait]
impl Agent for WebSearchAgent {
    fn name(&self) -> &str {
        "web_search"
    }

    fn can_handle(&self, text: &str) -> f32 {
        let lower = text.to_lowercase();
        if lower.contains("search") || lower.contains("look up") {
            return 0.9;
        }
        let hits = KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
        if hits > 0 { 0.6 } else { 0.0 }
    }

    async fn execute(
        &self,
        turn_id: TurnId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let query = normalize_query(text);
        tracing::info!(turn = %turn_id, query = %query, "web search");

        let results = tokio::select! {
            results = self.search(&query, Some(RESULT_LIMIT)) => results?,
            () = cancel.cancelled() => {
                tracing::debug!(turn = %turn_id, "search abandoned");
                return Err(Error::Agent("cancelled".to_string()));
            }
        };

        Ok(summarize(&query, &results))
    }
}
