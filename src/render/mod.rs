pub mod html;
pub mod readme;
pub mod view;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::analysis::AnalysisReport;
use crate::error::StoreError;
use crate::pipeline::latest_snapshots;
use crate::snapshot::SnapshotStore;
use crate::sources::SourceSpec;

/// Rebuild one source's dashboard from its latest snapshots. Unreadable
/// snapshots or analysis files are left out of the page.
pub fn render_source(
    store: &SnapshotStore,
    source: &SourceSpec,
    docs_dir: &Path,
    generated: &str,
) -> Result<PathBuf, StoreError> {
    let snapshots = latest_snapshots(store, source);
    let analysis: Option<AnalysisReport> = if source.analyzable {
        store
            .read_latest_analysis(&source.id)
            .unwrap_or_else(|e| {
                warn!(source = %source.id, error = %e, "skipping unreadable analysis");
                None
            })
    } else {
        None
    };

    let view = view::dashboard(source, &snapshots, analysis.as_ref(), generated);
    let path = html::write_dashboard(docs_dir, &source.id, &html::render_dashboard(&view))?;
    info!(
        source = %source.id,
        categories = snapshots.len(),
        path = %path.display(),
        "dashboard written"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{Local, NaiveDate, TimeZone};

    use super::*;
    use crate::extract::RawRecord;
    use crate::rank::RankedRecord;
    use crate::snapshot::{Snapshot, SnapshotKey};
    use crate::sources::catalogue;

    fn robinhood() -> SourceSpec {
        catalogue().into_iter().find(|s| s.id == "robinhood").unwrap()
    }

    #[test]
    fn corrupt_category_does_not_block_dashboard() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().join("data"));
        let docs = tmp.path().join("docs");

        let mut fields = RawRecord::new();
        fields.insert("stock_symbol".into(), Some("NVDA".into()));
        fields.insert("percent_change".into(), Some("+2.1%".into()));
        store
            .write(&Snapshot {
                key: SnapshotKey::new("robinhood", "most_popular", None),
                category_name: "最受欢迎股票".into(),
                category_url: String::new(),
                crawl_time: Local.with_ymd_and_hms(2026, 3, 9, 9, 0, 0).unwrap(),
                item_label: "stocks".into(),
                total_count: 1,
                records: vec![RankedRecord {
                    rank: 1,
                    sort_key: 0,
                    fields,
                }],
            })
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let broken = store.path_for(&SnapshotKey::new("robinhood", "top_movers", None), date);
        fs::write(&broken, "{ \"category_id\": ").unwrap();
        fs::write(store.analysis_path("robinhood", date), "not json").unwrap();

        let path = render_source(&store, &robinhood(), &docs, "2026-03-09 09:00").unwrap();
        let html = fs::read_to_string(path).unwrap();
        assert!(html.contains("NVDA"));
        assert!(!html.contains("Stock analysis"));
    }
}
