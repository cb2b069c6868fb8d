//! Snapshot → view model. No markup here; everything is plain data.

use crate::analysis::AnalysisReport;
use crate::extract::field_text;
use crate::normalize::{parse_currency, parse_percent};
use crate::rank::RankedRecord;
use crate::snapshot::{Snapshot, DATE_FORMAT};
use crate::sources::{RenderProfile, SourceSpec};

pub const GREEN: &str = "#4CAF50";
pub const AMBER: &str = "#FFC107";
pub const RED: &str = "#F44336";

const CHART_ROWS: usize = 10;
const TABLE_ROWS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Positive,
    Neutral,
    Negative,
    Plain,
}

impl Tone {
    pub fn css_class(self) -> &'static str {
        match self {
            Tone::Positive => "positive",
            Tone::Neutral => "neutral",
            Tone::Negative => "negative",
            Tone::Plain => "",
        }
    }

    fn of_change(change: f64) -> Tone {
        if change >= 0.0 {
            Tone::Positive
        } else {
            Tone::Negative
        }
    }

    fn of_score(score: u8) -> Tone {
        match score {
            80..=u8::MAX => Tone::Positive,
            60..=79 => Tone::Neutral,
            _ => Tone::Negative,
        }
    }

    fn color(self) -> &'static str {
        match self {
            Tone::Positive => GREEN,
            Tone::Neutral => AMBER,
            Tone::Negative => RED,
            Tone::Plain => "#1e88e5",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub id: String,
    pub title: String,
    pub value_label: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub colors: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub rank: usize,
    pub id: String,
    pub name: String,
    pub price: String,
    pub change: String,
    pub key: u64,
    pub link: Option<String>,
    pub tone: Tone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryView {
    pub title: String,
    pub date: String,
    pub total_count: usize,
    pub key_label: String,
    pub has_price: bool,
    pub has_change: bool,
    pub chart: ChartSpec,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRow {
    pub symbol: String,
    pub name: String,
    pub score: u8,
    pub recommendation: String,
    pub reason: String,
    pub tone: Tone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisView {
    pub chart: ChartSpec,
    pub rows: Vec<AnalysisRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub title: String,
    pub generated: String,
    pub categories: Vec<CategoryView>,
    pub analysis: Option<AnalysisView>,
}

fn text(record: &RankedRecord, field: Option<&str>) -> String {
    field
        .and_then(|f| field_text(&record.fields, f))
        .unwrap_or_default()
        .to_string()
}

fn change_of(record: &RankedRecord, profile: &RenderProfile) -> Option<f64> {
    let field = profile.change_field.as_deref()?;
    field_text(&record.fields, field).map(parse_percent)
}

fn chart_id(snapshot: &Snapshot) -> String {
    snapshot
        .key
        .stem()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Change chart when the source has a change column, sort-key chart otherwise.
pub fn category_chart(snapshot: &Snapshot, profile: &RenderProfile) -> ChartSpec {
    let top = snapshot.records.iter().take(CHART_ROWS);
    let (labels, values, colors) = if profile.change_field.is_some() {
        top.map(|r| {
            let change = change_of(r, profile).unwrap_or(0.0);
            (
                text(r, Some(profile.id_field.as_str())),
                change,
                Tone::of_change(change).color(),
            )
        })
        .fold((vec![], vec![], vec![]), push3)
    } else {
        top.map(|r| {
            (
                text(r, Some(profile.id_field.as_str())),
                r.sort_key as f64,
                Tone::Plain.color(),
            )
        })
        .fold((vec![], vec![], vec![]), push3)
    };

    ChartSpec {
        id: format!("{}_chart", chart_id(snapshot)),
        title: snapshot.category_name.clone(),
        value_label: if profile.change_field.is_some() {
            "Change (%)".to_string()
        } else {
            profile.key_label.clone()
        },
        labels,
        values,
        colors,
    }
}

#[allow(clippy::type_complexity)]
fn push3(
    mut acc: (Vec<String>, Vec<f64>, Vec<&'static str>),
    item: (String, f64, &'static str),
) -> (Vec<String>, Vec<f64>, Vec<&'static str>) {
    acc.0.push(item.0);
    acc.1.push(item.1);
    acc.2.push(item.2);
    acc
}

pub fn category_view(snapshot: &Snapshot, profile: &RenderProfile) -> CategoryView {
    let rows = snapshot
        .records
        .iter()
        .take(TABLE_ROWS)
        .map(|r| {
            let price = text(r, profile.price_field.as_deref());
            TableRow {
                rank: r.rank,
                id: text(r, Some(profile.id_field.as_str())),
                name: text(r, Some(profile.name_field.as_str())),
                price: if price.is_empty() { price } else { parse_currency(&price) },
                change: text(r, profile.change_field.as_deref()),
                key: r.sort_key,
                link: profile
                    .link_field
                    .as_deref()
                    .and_then(|f| field_text(&r.fields, f))
                    .map(str::to_string),
                tone: change_of(r, profile).map_or(Tone::Plain, Tone::of_change),
            }
        })
        .collect();

    CategoryView {
        title: snapshot.category_name.clone(),
        date: snapshot.date().format(DATE_FORMAT).to_string(),
        total_count: snapshot.total_count,
        key_label: profile.key_label.clone(),
        has_price: profile.price_field.is_some(),
        has_change: profile.change_field.is_some(),
        chart: category_chart(snapshot, profile),
        rows,
    }
}

pub fn analysis_view(report: &AnalysisReport) -> AnalysisView {
    let chart = ChartSpec {
        id: "analysis_chart".to_string(),
        title: "Stock scores".to_string(),
        value_label: "Score".to_string(),
        labels: report.scores.iter().map(|s| s.stock_symbol.clone()).collect(),
        values: report.scores.iter().map(|s| f64::from(s.score)).collect(),
        colors: report
            .scores
            .iter()
            .map(|s| Tone::of_score(s.score).color())
            .collect(),
    };
    let rows = report
        .scores
        .iter()
        .map(|s| AnalysisRow {
            symbol: s.stock_symbol.clone(),
            name: s.stock_name.clone(),
            score: s.score,
            recommendation: s.recommendation.to_string(),
            reason: s.reason.clone(),
            tone: Tone::of_score(s.score),
        })
        .collect();
    AnalysisView { chart, rows }
}

pub fn dashboard(
    source: &SourceSpec,
    snapshots: &[Snapshot],
    analysis: Option<&AnalysisReport>,
    generated: &str,
) -> DashboardView {
    DashboardView {
        title: format!("{} Dashboard", source.title),
        generated: generated.to_string(),
        categories: snapshots
            .iter()
            .map(|s| category_view(s, &source.render))
            .collect(),
        analysis: analysis.filter(|a| !a.scores.is_empty()).map(analysis_view),
    }
}
