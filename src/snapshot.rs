//! Dated, immutable JSON snapshots on disk.
//!
//! Layout: `{data_dir}/{source_id}/{file}` where `file` is
//! `{category_id}_{YYYY-MM-DD}.json` or, for sources with a period dimension,
//! `{source_id}_{category_id}_{period}_{YYYY-MM-DD}.json`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDate};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::rank::RankedRecord;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
const ANALYSIS_PREFIX: &str = "stock_analysis";

static DATED_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)_(\d{4}-\d{2}-\d{2})\.json$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    pub source_id: String,
    pub category_id: String,
    pub period: Option<String>,
}

impl SnapshotKey {
    pub fn new(source_id: &str, category_id: &str, period: Option<&str>) -> Self {
        SnapshotKey {
            source_id: source_id.to_string(),
            category_id: category_id.to_string(),
            period: period.map(str::to_string),
        }
    }

    /// File name without the `_{date}.json` suffix.
    pub fn stem(&self) -> String {
        match &self.period {
            Some(period) => format!("{}_{}_{}", self.source_id, self.category_id, period),
            None => self.category_id.clone(),
        }
    }

    pub fn file_name(&self, date: NaiveDate) -> String {
        format!("{}_{}.json", self.stem(), date.format(DATE_FORMAT))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub key: SnapshotKey,
    pub category_name: String,
    pub category_url: String,
    pub crawl_time: DateTime<Local>,
    /// Collection name in the JSON document: `products`, `stocks`, ...
    pub item_label: String,
    pub total_count: usize,
    pub records: Vec<RankedRecord>,
}

impl Snapshot {
    pub fn date(&self) -> NaiveDate {
        self.crawl_time.date_naive()
    }

    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        let mut obj = Map::new();
        obj.insert("source_id".into(), self.key.source_id.clone().into());
        obj.insert("category_id".into(), self.key.category_id.clone().into());
        if let Some(period) = &self.key.period {
            obj.insert("period".into(), period.clone().into());
        }
        obj.insert("category_name".into(), self.category_name.clone().into());
        obj.insert("category_url".into(), self.category_url.clone().into());
        obj.insert("crawl_time".into(), self.crawl_time.to_rfc3339().into());
        obj.insert(format!("total_{}", self.item_label), self.total_count.into());
        obj.insert(self.item_label.clone(), serde_json::to_value(&self.records)?);
        Ok(Value::Object(obj))
    }

    pub fn from_json(value: Value) -> Result<Self, String> {
        let Value::Object(mut obj) = value else {
            return Err("snapshot is not a JSON object".to_string());
        };
        let text = |obj: &Map<String, Value>, k: &str| -> Result<String, String> {
            obj.get(k)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| format!("missing '{}'", k))
        };

        let source_id = text(&obj, "source_id")?;
        let category_id = text(&obj, "category_id")?;
        let period = obj.get("period").and_then(Value::as_str).map(str::to_string);
        let category_name = text(&obj, "category_name")?;
        let category_url = text(&obj, "category_url").unwrap_or_default();
        let crawl_time = DateTime::parse_from_rfc3339(&text(&obj, "crawl_time")?)
            .map_err(|e| format!("bad crawl_time: {}", e))?
            .with_timezone(&Local);

        let (total_key, total_count) = obj
            .iter()
            .find_map(|(k, v)| {
                let n = v.as_u64()?;
                k.starts_with("total_").then(|| (k.clone(), n as usize))
            })
            .ok_or_else(|| "missing 'total_<items>' count".to_string())?;
        let item_label = total_key["total_".len()..].to_string();
        let items = obj
            .remove(&item_label)
            .ok_or_else(|| format!("missing '{}' list", item_label))?;
        let records: Vec<RankedRecord> =
            serde_json::from_value(items).map_err(|e| e.to_string())?;

        Ok(Snapshot {
            key: SnapshotKey {
                source_id,
                category_id,
                period,
            },
            category_name,
            category_url,
            crawl_time,
            item_label,
            total_count,
            records,
        })
    }
}

pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SnapshotStore { root: root.into() }
    }

    pub fn source_dir(&self, source_id: &str) -> PathBuf {
        self.root.join(source_id)
    }

    pub fn path_for(&self, key: &SnapshotKey, date: NaiveDate) -> PathBuf {
        self.source_dir(&key.source_id).join(key.file_name(date))
    }

    pub fn exists(&self, key: &SnapshotKey, date: NaiveDate) -> bool {
        self.path_for(key, date).is_file()
    }

    /// Pretty JSON via temp-file-then-rename, so readers never see a partial file.
    pub fn write(&self, snapshot: &Snapshot) -> Result<PathBuf, StoreError> {
        let path = self.path_for(&snapshot.key, snapshot.date());
        let doc = snapshot
            .to_json()
            .map_err(|e| StoreError::json(&path, e))?;
        write_json_atomic(&path, &doc)?;
        Ok(path)
    }

    pub fn read(&self, path: &Path) -> Result<Snapshot, StoreError> {
        let value: Value = read_json(path)?;
        Snapshot::from_json(value).map_err(|msg| {
            StoreError::json(path, serde::de::Error::custom(msg))
        })
    }

    /// Newest dated file for the key, by `YYYY-MM-DD` string order.
    pub fn latest_file(&self, key: &SnapshotKey) -> Result<Option<(NaiveDate, PathBuf)>, StoreError> {
        latest_with_stem(&self.source_dir(&key.source_id), &key.stem())
    }

    pub fn read_latest(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, StoreError> {
        match self.latest_file(key)? {
            Some((_, path)) => self.read(&path).map(Some),
            None => Ok(None),
        }
    }

    pub fn analysis_path(&self, source_id: &str, date: NaiveDate) -> PathBuf {
        self.source_dir(source_id)
            .join(format!("{}_{}.json", ANALYSIS_PREFIX, date.format(DATE_FORMAT)))
    }

    pub fn write_analysis<T: Serialize>(
        &self,
        source_id: &str,
        date: NaiveDate,
        report: &T,
    ) -> Result<PathBuf, StoreError> {
        let path = self.analysis_path(source_id, date);
        let doc = serde_json::to_value(report).map_err(|e| StoreError::json(&path, e))?;
        write_json_atomic(&path, &doc)?;
        Ok(path)
    }

    pub fn latest_analysis_file(
        &self,
        source_id: &str,
    ) -> Result<Option<(NaiveDate, PathBuf)>, StoreError> {
        latest_with_stem(&self.source_dir(source_id), ANALYSIS_PREFIX)
    }

    pub fn read_latest_analysis<T: DeserializeOwned>(
        &self,
        source_id: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.latest_analysis_file(source_id)? {
            Some((_, path)) => read_json(&path).map(Some),
            None => Ok(None),
        }
    }
}

fn latest_with_stem(dir: &Path, stem: &str) -> Result<Option<(NaiveDate, PathBuf)>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(dir, e)),
    };

    let mut best: Option<(String, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(caps) = DATED_FILE_RE.captures(name) else { continue };
        if &caps[1] != stem {
            continue;
        }
        let date = caps[2].to_string();
        if best.as_ref().map_or(true, |(d, _)| date > *d) {
            best = Some((date, entry.path()));
        }
    }

    Ok(best.and_then(|(date, path)| {
        NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .ok()
            .map(|d| (d, path))
    }))
}

fn write_json_atomic(path: &Path, doc: &Value) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let body = serde_json::to_string_pretty(doc).map_err(|e| StoreError::json(path, e))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("snapshot.json");
    let tmp = dir.join(format!(".{}.tmp", file_name));

    let mut file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(body.as_bytes())
        .and_then(|_| file.write_all(b"\n"))
        .and_then(|_| file.sync_all())
        .map_err(|e| StoreError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let body = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_str(&body).map_err(|e| StoreError::json(path, e))
}
