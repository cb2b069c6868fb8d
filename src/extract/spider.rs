use std::sync::Arc;

use serde_json::Value;
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};

use crate::error::{ConfigError, FetchError};

pub const SPIDER_KEY_VAR: &str = "SPIDER_API_KEY";

/// Hosted crawler client from `SPIDER_API_KEY`.
pub fn client_from_env() -> Result<Arc<Spider>, ConfigError> {
    let api_key =
        std::env::var(SPIDER_KEY_VAR).map_err(|_| ConfigError::MissingCredential(SPIDER_KEY_VAR))?;
    let spider = Spider::new(Some(api_key))
        .map_err(|e| ConfigError::Invalid(format!("failed to create spider client: {}", e)))?;
    Ok(Arc::new(spider))
}

/// Fetch a page through the hosted browser and return its rendered HTML.
pub async fn fetch_rendered_html(spider: &Spider, url: &str) -> Result<String, FetchError> {
    let params = RequestParams {
        return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
        ..Default::default()
    };

    let response = spider
        .scrape_url(url, Some(params), "application/json")
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;

    page_content(response)
}

/// Pull `content` out of the crawler's `[{content, status, ...}]` envelope.
fn page_content(response: Value) -> Result<String, FetchError> {
    let parsed: Value = match response.as_str() {
        Some(s) => serde_json::from_str(s)?,
        None => response,
    };

    let first = parsed
        .as_array()
        .and_then(|arr| arr.first())
        .ok_or_else(|| FetchError::Parse("crawler response is not a page array".to_string()))?;

    if let Some(status) = first.get("status").and_then(|s| s.as_i64()) {
        if status >= 400 {
            return Err(FetchError::Network(format!("page returned status {}", status)));
        }
    }

    match first.get("content").and_then(|c| c.as_str()) {
        Some(html) if !html.trim().is_empty() => Ok(html.to_string()),
        _ => Err(FetchError::EmptyExtraction),
    }
}
