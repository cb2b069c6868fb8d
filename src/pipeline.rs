//! Per-source crawl: fetch with retry, normalize, rank, snapshot.

use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::extract::Extractor;
use crate::normalize::normalize;
use crate::rank::rank;
use crate::retry::{RetryController, RetryPolicy, Sleeper};
use crate::settings::Settings;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::sources::{Category, SourceSpec};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &CategoryOutcome) {
        match outcome {
            CategoryOutcome::Written(_) => self.written += 1,
            CategoryOutcome::Skipped => self.skipped += 1,
            CategoryOutcome::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

#[derive(Debug, PartialEq)]
pub enum CategoryOutcome {
    Written(PathBuf),
    Skipped,
    Failed,
}

pub struct Pipeline<'a> {
    settings: &'a Settings,
    extractor: &'a dyn Extractor,
    sleeper: &'a dyn Sleeper,
    store: SnapshotStore,
    policy: RetryPolicy,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a Settings, extractor: &'a dyn Extractor, sleeper: &'a dyn Sleeper) -> Self {
        Pipeline {
            settings,
            extractor,
            sleeper,
            store: SnapshotStore::new(&settings.data_dir),
            policy: settings.retry.policy(),
        }
    }

    /// Every category of every source, sequentially. `now` is the capture time
    /// for the whole run, so the skip check and file dates agree.
    pub async fn run(&self, sources: &[SourceSpec], now: DateTime<Local>) -> RunSummary {
        let total: usize = sources.iter().map(|s| s.categories.len()).sum();
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        let mut summary = RunSummary::default();
        let mut fetched = false;
        for source in sources {
            let mut source_summary = RunSummary::default();
            for category in &source.categories {
                pb.set_message(format!("{}/{}", source.id, category.id));
                let outcome = self.run_category(source, category, now, &mut fetched).await;
                source_summary.record(&outcome);
                pb.inc(1);
            }
            info!(
                source = %source.id,
                written = source_summary.written,
                skipped = source_summary.skipped,
                failed = source_summary.failed,
                "source finished"
            );
            summary.merge(source_summary);
        }
        pb.finish_and_clear();

        info!(
            written = summary.written,
            skipped = summary.skipped,
            failed = summary.failed,
            "crawl finished"
        );
        summary
    }

    async fn run_category(
        &self,
        source: &SourceSpec,
        category: &Category,
        now: DateTime<Local>,
        fetched: &mut bool,
    ) -> CategoryOutcome {
        let key = source.key(category);
        if self.store.exists(&key, now.date_naive()) {
            info!(source = %source.id, category = %key.stem(), "snapshot for today exists, skipping");
            return CategoryOutcome::Skipped;
        }

        if *fetched {
            self.sleeper.sleep(self.settings.request_delay()).await;
        }
        *fetched = true;

        let label = format!("{}/{}", source.id, key.stem());
        let outcome = RetryController::new(&self.policy, self.sleeper)
            .fetch(self.extractor, &label, &category.url, &source.schema)
            .await;
        let Some(raw) = outcome.into_records() else {
            return CategoryOutcome::Failed;
        };

        let ranking = rank(normalize(raw, &source.sort_rule), source.limit);
        if ranking.records.is_empty() {
            warn!(source = %source.id, category = %key.stem(), "no record carried a ranking field");
            return CategoryOutcome::Failed;
        }

        let snapshot = Snapshot {
            key,
            category_name: category.name.clone(),
            category_url: category.url.clone(),
            crawl_time: now,
            item_label: source.item_label.clone(),
            total_count: ranking.total_count,
            records: ranking.records,
        };
        match self.store.write(&snapshot) {
            Ok(path) => {
                info!(
                    source = %source.id,
                    category = %snapshot.key.stem(),
                    records = snapshot.records.len(),
                    total = snapshot.total_count,
                    path = %path.display(),
                    "snapshot saved"
                );
                CategoryOutcome::Written(path)
            }
            Err(e) => {
                error!(source = %source.id, category = %snapshot.key.stem(), error = %e, "snapshot write failed");
                CategoryOutcome::Failed
            }
        }
    }
}

/// Latest snapshot of each category that has one, in catalogue order.
/// An unreadable category is logged and left out.
pub fn latest_snapshots(store: &SnapshotStore, source: &SourceSpec) -> Vec<Snapshot> {
    let mut out = Vec::new();
    for category in &source.categories {
        match store.read_latest(&source.key(category)) {
            Ok(Some(snapshot)) => out.push(snapshot),
            Ok(None) => {}
            Err(e) => {
                warn!(source = %source.id, category = %category.id, error = %e, "skipping unreadable snapshot")
            }
        }
    }
    out
}

pub struct StatusRow {
    pub source_id: String,
    pub category: String,
    pub latest: Option<NaiveDate>,
}

pub fn status(store: &SnapshotStore, sources: &[SourceSpec]) -> Result<Vec<StatusRow>, StoreError> {
    let mut rows = Vec::new();
    for source in sources {
        for category in &source.categories {
            let key = source.key(category);
            let latest = store.latest_file(&key)?.map(|(date, _)| date);
            rows.push(StatusRow {
                source_id: source.id.clone(),
                category: key.stem(),
                latest,
            });
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::error::FetchError;
    use crate::extract::{FieldSchema, JsonField, RawRecord};
    use crate::normalize::{KeyParser, SortKeyRule};
    use crate::retry::testing::{one_record, RecordingSleeper, ScriptedExtractor};
    use crate::sources::RenderProfile;

    fn ok_one() -> Result<Vec<RawRecord>, FetchError> {
        Ok(one_record())
    }

    fn sales(values: &[&str]) -> Vec<RawRecord> {
        values
            .iter()
            .map(|v| {
                let mut r = RawRecord::new();
                r.insert("sales".into(), Some(v.to_string()));
                r
            })
            .collect()
    }

    fn source(category_ids: &[&str]) -> SourceSpec {
        SourceSpec {
            id: "shop".into(),
            title: "Shop".into(),
            item_label: "products".into(),
            categories: category_ids
                .iter()
                .map(|id| Category {
                    id: id.to_string(),
                    name: id.to_uppercase(),
                    url: format!("http://shop.test/{}", id),
                    period: None,
                })
                .collect(),
            schema: FieldSchema::JsonArray {
                fields: vec![JsonField::new("sales", "sales")],
            },
            sort_rule: SortKeyRule::new("sales", KeyParser::CountWithUnit),
            limit: 10,
            render: RenderProfile {
                id_field: "sales".into(),
                name_field: "sales".into(),
                price_field: None,
                change_field: None,
                link_field: None,
                key_label: "Sales".into(),
            },
            analyzable: false,
        }
    }

    fn settings(dir: &std::path::Path) -> Settings {
        Settings {
            data_dir: dir.to_path_buf(),
            request_delay_secs: 2,
            ..Settings::default()
        }
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 9, 8, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn second_run_same_day_does_not_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());
        let extractor = ScriptedExtractor::new(vec![], ok_one);
        let sleeper = RecordingSleeper::default();
        let pipeline = Pipeline::new(&settings, &extractor, &sleeper);
        let sources = vec![source(&["a"])];

        let first = pipeline.run(&sources, now()).await;
        let second = pipeline.run(&sources, now()).await;

        assert_eq!(first, RunSummary { written: 1, skipped: 0, failed: 0 });
        assert_eq!(second, RunSummary { written: 0, skipped: 1, failed: 0 });
        assert_eq!(extractor.calls(), 1);
        assert_eq!(std::fs::read_dir(tmp.path().join("shop")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn failed_category_does_not_stop_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());
        let extractor =
            ScriptedExtractor::new(vec![Err(FetchError::Parse("html, not json".into()))], ok_one);
        let sleeper = RecordingSleeper::default();
        let pipeline = Pipeline::new(&settings, &extractor, &sleeper);

        let summary = pipeline.run(&[source(&["broken", "fine"])], now()).await;

        assert_eq!(summary, RunSummary { written: 1, skipped: 0, failed: 1 });
        let store = SnapshotStore::new(tmp.path());
        let date = now().date_naive();
        assert!(!store.exists(&crate::snapshot::SnapshotKey::new("shop", "broken", None), date));
        assert!(store.exists(&crate::snapshot::SnapshotKey::new("shop", "fine", None), date));
    }

    #[tokio::test]
    async fn courtesy_delay_between_fetches_only() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());
        let extractor = ScriptedExtractor::new(vec![], ok_one);
        let sleeper = RecordingSleeper::default();
        let pipeline = Pipeline::new(&settings, &extractor, &sleeper);

        pipeline.run(&[source(&["a", "b", "c"])], now()).await;

        assert_eq!(*sleeper.delays.lock().unwrap(), vec![Duration::from_secs(2); 2]);
    }

    #[tokio::test]
    async fn sales_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());
        let extractor = ScriptedExtractor::new(vec![Ok(sales(&["1.2万", "500", ""]))], ok_one);
        let sleeper = RecordingSleeper::default();
        let pipeline = Pipeline::new(&settings, &extractor, &sleeper);
        let sources = vec![source(&["apparel"])];

        pipeline.run(&sources, now()).await;

        let store = SnapshotStore::new(tmp.path());
        let latest = latest_snapshots(&store, &sources[0]);
        assert_eq!(latest.len(), 1);
        let snap = &latest[0];
        assert_eq!(snap.total_count, 2);
        assert_eq!(snap.category_name, "APPAREL");
        let ranked: Vec<(usize, u64)> = snap.records.iter().map(|r| (r.rank, r.sort_key)).collect();
        assert_eq!(ranked, vec![(1, 12_000), (2, 500)]);
    }

    #[tokio::test]
    async fn nothing_rankable_is_a_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());
        let extractor = ScriptedExtractor::new(vec![Ok(sales(&["", " "]))], ok_one);
        let sleeper = RecordingSleeper::default();
        let pipeline = Pipeline::new(&settings, &extractor, &sleeper);

        let summary = pipeline.run(&[source(&["a"])], now()).await;
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn status_lists_latest_dates() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());
        let extractor = ScriptedExtractor::new(vec![], ok_one);
        let sleeper = RecordingSleeper::default();
        let pipeline = Pipeline::new(&settings, &extractor, &sleeper);
        let sources = vec![source(&["a", "b"])];

        let store = SnapshotStore::new(tmp.path());
        pipeline.run(&[source(&["a"])], now()).await;
        let rows = status(&store, &sources).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].latest, Some(now().date_naive()));
        assert_eq!(rows[1].category, "b");
        assert_eq!(rows[1].latest, None);
    }

    #[tokio::test]
    async fn corrupt_category_is_skipped_on_read() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());
        let extractor = ScriptedExtractor::new(vec![], ok_one);
        let sleeper = RecordingSleeper::default();
        let pipeline = Pipeline::new(&settings, &extractor, &sleeper);
        let sources = vec![source(&["good", "bad"])];
        pipeline.run(&[source(&["good"])], now()).await;

        let store = SnapshotStore::new(tmp.path());
        let bad = store.path_for(
            &crate::snapshot::SnapshotKey::new("shop", "bad", None),
            now().date_naive(),
        );
        std::fs::write(&bad, "{ truncated").unwrap();

        let latest = latest_snapshots(&store, &sources[0]);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].key.category_id, "good");
    }
}
