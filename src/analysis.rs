//! Stock scoring through an external LLM.
//!
//! The latest stock snapshots are summarised, sent to the scorer, and the reply is
//! stored next to the snapshots as `stock_analysis_{date}.json`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{AnalysisError, ConfigError};
use crate::extract::field_text;
use crate::snapshot::{Snapshot, SnapshotStore};

pub const ANTHROPIC_KEY_VAR: &str = "ANTHROPIC_API_KEY";
const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const SYSTEM_PROMPT: &str =
    "You are a professional financial analyst. Reply with JSON only, no other text.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Buy,
    Hold,
    Sell,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::Buy => "buy",
            Recommendation::Hold => "hold",
            Recommendation::Sell => "sell",
        };
        f.write_str(s)
    }
}

impl FromStr for Recommendation {
    type Err = String;

    /// Accepts English or Chinese labels, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if lower.contains("sell") || lower.contains("卖") {
            Ok(Recommendation::Sell)
        } else if lower.contains("buy") || lower.contains("买") {
            Ok(Recommendation::Buy)
        } else if lower.contains("hold") || lower.contains("持有") {
            Ok(Recommendation::Hold)
        } else {
            Err(format!("unknown recommendation '{}'", s))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub stock_symbol: String,
    pub stock_name: String,
    pub score: u8,
    pub recommendation: Recommendation,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub scores: Vec<AnalysisResult>,
}

/// One line of scorer input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockSummary {
    pub symbol: String,
    pub name: String,
    pub price: String,
    pub change: String,
    pub percent: String,
    pub rank: usize,
}

/// Top `per_category` stocks of every snapshot, in rank order.
pub fn summarize(snapshots: &[Snapshot], per_category: usize) -> Vec<StockSummary> {
    snapshots
        .iter()
        .flat_map(|s| s.records.iter().take(per_category))
        .map(|r| {
            let get = |k: &str| field_text(&r.fields, k).unwrap_or_default().to_string();
            StockSummary {
                symbol: get("stock_symbol"),
                name: get("stock_name"),
                price: get("stock_price"),
                change: get("price_change"),
                percent: get("percent_change"),
                rank: r.rank,
            }
        })
        .collect()
}

pub fn build_prompt(stocks: &[StockSummary]) -> String {
    let data = serde_json::to_string_pretty(stocks).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Based on the following Robinhood stock data, decide which stocks are the best \
investment opportunities. Return only JSON in this format:\n\
{{\n  \"scores\": [\n    {{\n      \"stock_symbol\": \"<symbol>\",\n      \"stock_name\": \"<name>\",\n      \
\"score\": <0-100>,\n      \"recommendation\": \"<buy|hold|sell>\",\n      \"reason\": \"<short reason>\"\n    }}\n  ]\n}}\n\n\
Stock data:\n{}\n\nReturn only JSON.",
        data
    )
}

#[derive(Deserialize)]
struct LooseReport {
    #[serde(default)]
    scores: Vec<LooseScore>,
}

#[derive(Deserialize)]
struct LooseScore {
    #[serde(default)]
    stock_symbol: String,
    #[serde(default)]
    stock_name: String,
    #[serde(default)]
    score: Value,
    #[serde(default)]
    recommendation: String,
    #[serde(default)]
    reason: String,
}

/// Parse the scorer's reply. Prose around the JSON object is ignored, scores are
/// clamped to 0..=100 and entries without a symbol or a known recommendation dropped.
pub fn parse_scores(reply: &str) -> Result<AnalysisReport, AnalysisError> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let body = match (start, end) {
        (Some(s), Some(e)) if s < e => &reply[s..=e],
        _ => return Err(AnalysisError::Response("no JSON object in reply".to_string())),
    };
    let loose: LooseReport =
        serde_json::from_str(body).map_err(|e| AnalysisError::Response(e.to_string()))?;

    let scores = loose
        .scores
        .into_iter()
        .filter_map(|s| {
            let symbol = s.stock_symbol.trim().to_string();
            if symbol.is_empty() {
                return None;
            }
            let recommendation = match s.recommendation.parse() {
                Ok(r) => r,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "dropping score");
                    return None;
                }
            };
            let raw = match &s.score {
                Value::Number(n) => n.as_f64().unwrap_or(0.0),
                Value::String(t) => t.trim().parse().unwrap_or(0.0),
                _ => 0.0,
            };
            Some(AnalysisResult {
                stock_symbol: symbol,
                stock_name: s.stock_name.trim().to_string(),
                score: raw.clamp(0.0, 100.0).round() as u8,
                recommendation,
                reason: s.reason.trim().to_string(),
            })
        })
        .collect();

    Ok(AnalysisReport { scores })
}

#[async_trait]
pub trait StockScorer: Send + Sync {
    async fn score(&self, stocks: &[StockSummary]) -> Result<AnalysisReport, AnalysisError>;
}

/// Anthropic messages API scorer.
pub struct AnthropicScorer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicScorer {
    pub fn from_env(model: &str, max_tokens: u32, timeout: Duration) -> Result<Self, ConfigError> {
        let api_key = std::env::var(ANTHROPIC_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingCredential(ANTHROPIC_KEY_VAR))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(AnthropicScorer {
            client,
            api_key,
            model: model.to_string(),
            max_tokens,
        })
    }
}

#[async_trait]
impl StockScorer for AnthropicScorer {
    async fn score(&self, stocks: &[StockSummary]) -> Result<AnalysisReport, AnalysisError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": 0,
            "system": SYSTEM_PROMPT,
            "messages": [{ "role": "user", "content": build_prompt(stocks) }],
        });

        let reply: Value = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = reply["content"]
            .as_array()
            .and_then(|blocks| blocks.iter().find_map(|b| b["text"].as_str()))
            .ok_or_else(|| AnalysisError::Response("reply has no text block".to_string()))?;
        parse_scores(text)
    }
}

pub enum AnalysisRun {
    Skipped,
    Written { path: std::path::PathBuf, scored: usize },
}

/// Score the latest snapshots of a source unless today's analysis already exists.
pub async fn analyze_latest(
    store: &SnapshotStore,
    source_id: &str,
    snapshots: &[Snapshot],
    scorer: &dyn StockScorer,
    today: NaiveDate,
    per_category: usize,
) -> anyhow::Result<AnalysisRun> {
    if store.analysis_path(source_id, today).is_file() {
        info!(source = source_id, "analysis for today exists, skipping");
        return Ok(AnalysisRun::Skipped);
    }

    let stocks = summarize(snapshots, per_category);
    if stocks.is_empty() {
        return Err(AnalysisError::NoInput.into());
    }

    info!(source = source_id, stocks = stocks.len(), "scoring stocks");
    let report = scorer.score(&stocks).await?;
    let path = store.write_analysis(source_id, today, &report)?;
    info!(source = source_id, path = %path.display(), scored = report.scores.len(), "analysis saved");
    Ok(AnalysisRun::Written {
        path,
        scored: report.scores.len(),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Fixed reply, counts calls.
    pub struct MockScorer {
        pub reply: String,
        pub calls: AtomicUsize,
    }

    impl MockScorer {
        pub fn new(reply: &str) -> Self {
            MockScorer {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StockScorer for MockScorer {
        async fn score(&self, _stocks: &[StockSummary]) -> Result<AnalysisReport, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            parse_scores(&self.reply)
        }
    }
}
