use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{JsonField, RawRecord};
use crate::error::FetchError;

const ITEM_CONCURRENCY: usize = 10;
const ITEM_TIMEOUT: Duration = Duration::from_secs(10);

async fn get_json(client: &reqwest::Client, url: &str) -> Result<Value, FetchError> {
    let value = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<Value>()
        .await?;
    Ok(value)
}

/// Scalar JSON values as raw text; null becomes `None`.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Project an object onto the declared fields. Non-objects yield `None`.
pub fn record_from_object(value: &Value, fields: &[JsonField]) -> Option<RawRecord> {
    let obj = value.as_object()?;
    Some(
        fields
            .iter()
            .map(|f| (f.name.clone(), obj.get(&f.key).and_then(scalar_text)))
            .collect(),
    )
}

/// Records from a document whose top level is an array of objects.
pub fn records_from_array(doc: &Value, fields: &[JsonField]) -> Result<Vec<RawRecord>, FetchError> {
    let items = doc
        .as_array()
        .ok_or_else(|| FetchError::Parse("expected a top-level JSON array".to_string()))?;
    Ok(items
        .iter()
        .filter_map(|item| record_from_object(item, fields))
        .collect())
}

pub async fn fetch_array(
    client: &reqwest::Client,
    url: &str,
    fields: &[JsonField],
) -> Result<Vec<RawRecord>, FetchError> {
    let doc = get_json(client, url).await?;
    records_from_array(&doc, fields)
}

/// Fetch an id list, then every item concurrently.
pub async fn fetch_fanout(
    client: &reqwest::Client,
    ids_url: &str,
    item_url: &str,
    limit: usize,
    fields: &[JsonField],
) -> Result<Vec<RawRecord>, FetchError> {
    let doc = get_json(client, ids_url).await?;
    let ids: Vec<String> = doc
        .as_array()
        .ok_or_else(|| FetchError::Parse("expected a JSON array of ids".to_string()))?
        .iter()
        .filter_map(scalar_text)
        .take(limit)
        .collect();
    debug!(count = ids.len(), "fetching item details");

    let client = client.clone();
    let item_url = item_url.to_string();
    let fields = Arc::new(fields.to_vec());
    Ok(gather_items(ids, ITEM_TIMEOUT, move |id| {
        let client = client.clone();
        let url = item_url.replace("{id}", &id);
        let fields = Arc::clone(&fields);
        async move {
            let item = get_json(&client, &url).await?;
            Ok(record_from_object(&item, &fields))
        }
    })
    .await)
}

/// Run `fetch` for every id, at most `ITEM_CONCURRENCY` at a time.
///
/// An item that fails or exceeds `item_timeout` is dropped without cancelling
/// its siblings. Output keeps id order regardless of completion order.
pub(crate) async fn gather_items<F, Fut>(
    ids: Vec<String>,
    item_timeout: Duration,
    fetch: F,
) -> Vec<RawRecord>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Option<RawRecord>, FetchError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(ITEM_CONCURRENCY));
    let mut tasks = JoinSet::new();

    for (index, id) in ids.into_iter().enumerate() {
        let sem = Arc::clone(&semaphore);
        let item = fetch(id.clone());
        tasks.spawn(async move {
            let _permit = sem.acquire_owned().await.ok()?;
            match tokio::time::timeout(item_timeout, item).await {
                Ok(Ok(record)) => record.map(|r| (index, r)),
                Ok(Err(e)) => {
                    warn!(item = %id, error = %e, "item fetch failed");
                    None
                }
                Err(_) => {
                    warn!(item = %id, timeout_secs = item_timeout.as_secs(), "item fetch timed out");
                    None
                }
            }
        });
    }

    let mut gathered = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Ok(Some(pair)) = joined {
            gathered.push(pair);
        }
    }
    gathered.sort_by_key(|(index, _)| *index);
    gathered.into_iter().map(|(_, record)| record).collect()
}
