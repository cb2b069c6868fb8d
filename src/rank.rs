use serde::{Deserialize, Serialize};

use crate::extract::RawRecord;
use crate::normalize::NormalizedRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRecord {
    pub rank: usize,
    pub sort_key: u64,
    #[serde(flatten)]
    pub fields: RawRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub records: Vec<RankedRecord>,
    /// Rankable records before truncation.
    pub total_count: usize,
}

/// Drop unkeyed records, stable-sort descending, keep `limit`, number from 1.
pub fn rank_by<F>(records: Vec<NormalizedRecord>, key_fn: F, limit: usize) -> Ranking
where
    F: Fn(&NormalizedRecord) -> Option<u64>,
{
    let mut keyed: Vec<(u64, RawRecord)> = records
        .into_iter()
        .filter_map(|r| key_fn(&r).map(|k| (k, r.fields)))
        .collect();
    let total_count = keyed.len();

    // Vec::sort_by is stable: equal keys keep adapter order.
    keyed.sort_by(|a, b| b.0.cmp(&a.0));
    keyed.truncate(limit);

    let records = keyed
        .into_iter()
        .enumerate()
        .map(|(i, (sort_key, fields))| RankedRecord {
            rank: i + 1,
            sort_key,
            fields,
        })
        .collect();

    Ranking {
        records,
        total_count,
    }
}

/// Rank on the key the normalizer already derived.
pub fn rank(records: Vec<NormalizedRecord>, limit: usize) -> Ranking {
    rank_by(records, |r| r.sort_key, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize, KeyParser, SortKeyRule};

    fn keyed(id: &str, key: Option<u64>) -> NormalizedRecord {
        let mut fields = RawRecord::new();
        fields.insert("id".into(), Some(id.into()));
        NormalizedRecord {
            fields,
            sort_key: key,
        }
    }

    fn ids(ranking: &Ranking) -> Vec<&str> {
        ranking
            .records
            .iter()
            .map(|r| r.fields["id"].as_deref().unwrap())
            .collect()
    }

    #[test]
    fn ranks_are_contiguous() {
        let input = (0..37).map(|i| keyed(&i.to_string(), Some(i * 7 % 11))).collect();
        let out = rank(input, 100);
        let ranks: Vec<usize> = out.records.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, (1..=37).collect::<Vec<_>>());
        assert!(out.records.windows(2).all(|w| w[0].sort_key >= w[1].sort_key));
    }

    #[test]
    fn ties_keep_input_order() {
        let input = vec![
            keyed("a", Some(5)),
            keyed("b", Some(9)),
            keyed("c", Some(5)),
            keyed("d", Some(5)),
            keyed("e", Some(9)),
        ];
        let out = rank(input, 10);
        assert_eq!(ids(&out), vec!["b", "e", "a", "c", "d"]);
    }

    #[test]
    fn unkeyed_records_are_excluded() {
        let input = vec![keyed("a", None), keyed("b", Some(0)), keyed("c", None)];
        let out = rank(input, 10);
        assert_eq!(ids(&out), vec!["b"]);
        assert_eq!(out.total_count, 1);
    }

    #[test]
    fn truncation_reports_total() {
        let input = (0..150).map(|i| keyed(&i.to_string(), Some(i))).collect();
        let out = rank(input, 100);
        assert_eq!(out.records.len(), 100);
        assert_eq!(out.total_count, 150);
        assert_eq!(out.records[0].sort_key, 149);
        assert_eq!(out.records[99].rank, 100);
    }

    #[test]
    fn custom_key_fn() {
        let input = vec![keyed("a", Some(1)), keyed("b", Some(2))];
        let out = rank_by(input, |r| r.sort_key.map(|k| 10 - k), 10);
        assert_eq!(ids(&out), vec!["a", "b"]);
    }

    #[test]
    fn empty_input() {
        let out = rank(Vec::new(), 10);
        assert!(out.records.is_empty());
        assert_eq!(out.total_count, 0);
    }

    #[test]
    fn sales_scenario() {
        let raw: Vec<RawRecord> = ["1.2万", "500", ""]
            .iter()
            .map(|s| {
                let mut r = RawRecord::new();
                r.insert("sales".into(), Some(s.to_string()));
                r
            })
            .collect();
        let rule = SortKeyRule::new("sales", KeyParser::CountWithUnit);
        let out = rank(normalize(raw, &rule), 10);

        assert_eq!(out.total_count, 2);
        assert_eq!(out.records.len(), 2);
        assert_eq!((out.records[0].rank, out.records[0].sort_key), (1, 12_000));
        assert_eq!((out.records[1].rank, out.records[1].sort_key), (2, 500));
    }
}
