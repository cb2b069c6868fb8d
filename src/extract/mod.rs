pub mod api;
pub mod css;
pub mod spider;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::FetchError;

/// Field name → raw extracted text. `None` when the rule matched nothing.
pub type RawRecord = BTreeMap<String, Option<String>>;

/// Non-blank, trimmed text of a field.
pub fn field_text<'a>(record: &'a RawRecord, name: &str) -> Option<&'a str> {
    record
        .get(name)
        .and_then(|v| v.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Concatenated, whitespace-collapsed element text.
    Text,
    /// Raw attribute value.
    Attribute(String),
    /// Attribute value resolved against the page URL.
    Link(String),
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: String,
    pub selector: String,
    pub kind: FieldKind,
}

impl FieldRule {
    pub fn text(name: &str, selector: &str) -> Self {
        FieldRule {
            name: name.to_string(),
            selector: selector.to_string(),
            kind: FieldKind::Text,
        }
    }

    pub fn attr(name: &str, selector: &str, attr: &str) -> Self {
        FieldRule {
            name: name.to_string(),
            selector: selector.to_string(),
            kind: FieldKind::Attribute(attr.to_string()),
        }
    }

    pub fn link(name: &str, selector: &str, attr: &str) -> Self {
        FieldRule {
            name: name.to_string(),
            selector: selector.to_string(),
            kind: FieldKind::Link(attr.to_string()),
        }
    }
}

/// JSON key copied into a record field.
#[derive(Debug, Clone)]
pub struct JsonField {
    pub name: String,
    pub key: String,
}

impl JsonField {
    pub fn new(name: &str, key: &str) -> Self {
        JsonField {
            name: name.to_string(),
            key: key.to_string(),
        }
    }
}

/// Declarative description of how a page turns into records.
#[derive(Debug, Clone)]
pub enum FieldSchema {
    /// Rendered HTML; one record per `base_selector` match.
    Css {
        base_selector: String,
        fields: Vec<FieldRule>,
    },
    /// JSON document whose top level is an array of objects.
    JsonArray { fields: Vec<JsonField> },
    /// JSON array of ids; each id is fetched from `item_url` (`{id}` placeholder).
    IdFanout {
        item_url: String,
        limit: usize,
        fields: Vec<JsonField>,
    },
}

/// Fetch + extract contract the pipeline depends on.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn fetch_listing(
        &self,
        url: &str,
        schema: &FieldSchema,
    ) -> Result<Vec<RawRecord>, FetchError>;
}

/// Rendered pages go through the hosted crawler, JSON endpoints through reqwest.
pub struct WebExtractor {
    http: reqwest::Client,
    spider: Option<Arc<spider_client::Spider>>,
    timeout: Duration,
}

impl WebExtractor {
    pub fn new(
        http: reqwest::Client,
        spider: Option<Arc<spider_client::Spider>>,
        timeout: Duration,
    ) -> Self {
        WebExtractor {
            http,
            spider,
            timeout,
        }
    }

    async fn fetch_unbounded(
        &self,
        url: &str,
        schema: &FieldSchema,
    ) -> Result<Vec<RawRecord>, FetchError> {
        match schema {
            FieldSchema::Css {
                base_selector,
                fields,
            } => {
                let spider = self.spider.as_ref().ok_or_else(|| {
                    FetchError::Network("hosted crawler is not configured".to_string())
                })?;
                let html = spider::fetch_rendered_html(spider, url).await?;
                debug!(url, bytes = html.len(), "rendered page received");
                css::apply_schema(&html, base_selector, fields, url)
            }
            FieldSchema::JsonArray { fields } => api::fetch_array(&self.http, url, fields).await,
            FieldSchema::IdFanout {
                item_url,
                limit,
                fields,
            } => api::fetch_fanout(&self.http, url, item_url, *limit, fields).await,
        }
    }
}

/// Bound one attempt. Running out of time is a network failure, so it is retried.
async fn within<T, Fut>(timeout: Duration, attempt: Fut) -> Result<T, FetchError>
where
    Fut: Future<Output = Result<T, FetchError>>,
{
    tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| FetchError::Network(format!("timed out after {}s", timeout.as_secs())))?
}

#[async_trait]
impl Extractor for WebExtractor {
    async fn fetch_listing(
        &self,
        url: &str,
        schema: &FieldSchema,
    ) -> Result<Vec<RawRecord>, FetchError> {
        let records = within(self.timeout, self.fetch_unbounded(url, schema)).await?;
        if records.is_empty() {
            return Err(FetchError::EmptyExtraction);
        }
        Ok(records)
    }
}
