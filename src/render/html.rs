//! Static dashboard page. Every data value goes through `escape` or `script_json`.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;

use super::view::{AnalysisView, CategoryView, ChartSpec, DashboardView};
use crate::error::StoreError;

const CHART_JS: &str = "https://cdn.jsdelivr.net/npm/chart.js";

const STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; margin: 0; padding: 20px; background-color: #f5f5f5; color: #333; }
.container { max-width: 1200px; margin: 0 auto; }
header { background-color: #1e88e5; color: white; padding: 20px; border-radius: 8px; margin-bottom: 20px; }
header p { color: rgba(255,255,255,0.8); margin: 4px 0 0; }
section { background-color: white; border-radius: 8px; padding: 20px; margin-bottom: 20px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
h2 { color: #1e88e5; margin-top: 0; }
.chart-container { position: relative; height: 360px; margin-bottom: 30px; }
table { width: 100%; border-collapse: collapse; margin-bottom: 24px; }
th, td { padding: 8px 10px; text-align: left; border-bottom: 1px solid #ddd; }
th { background-color: #f2f2f2; }
tr:hover { background-color: #f5f5f5; }
.positive { color: #4CAF50; }
.negative { color: #F44336; }
.neutral { color: #FFC107; }
.meta { color: #666; font-size: 0.9em; }
"#;

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// JSON safe to place inside a `<script>` element.
pub fn script_json(value: &serde_json::Value) -> String {
    value.to_string().replace("</", "<\\/")
}

fn safe_href(url: &str) -> Option<String> {
    let lower = url.trim().to_ascii_lowercase();
    (lower.starts_with("http://") || lower.starts_with("https://")).then(|| escape(url.trim()))
}

fn chart(out: &mut String, chart: &ChartSpec) {
    let config = json!({
        "type": "bar",
        "data": {
            "labels": chart.labels,
            "datasets": [{
                "label": chart.value_label,
                "data": chart.values,
                "backgroundColor": chart.colors,
                "borderColor": chart.colors,
                "borderWidth": 1,
            }],
        },
        "options": {
            "responsive": true,
            "maintainAspectRatio": false,
            "plugins": {
                "title": { "display": true, "text": chart.title },
                "legend": { "display": false },
            },
        },
    });
    let _ = write!(
        out,
        "<div class=\"chart-container\"><canvas id=\"{id}\"></canvas></div>\n\
<script>new Chart(document.getElementById({id_js}), {config});</script>\n",
        id = escape(&chart.id),
        id_js = script_json(&json!(chart.id)),
        config = script_json(&config),
    );
}

fn category_section(out: &mut String, view: &CategoryView) {
    let _ = write!(
        out,
        "<section>\n<h2>{}</h2>\n<p class=\"meta\">{} · {} ranked</p>\n",
        escape(&view.title),
        escape(&view.date),
        view.total_count
    );
    chart(out, &view.chart);

    out.push_str("<table>\n<thead><tr><th>#</th><th>Item</th><th>Name</th>");
    if view.has_price {
        out.push_str("<th>Price</th>");
    }
    if view.has_change {
        out.push_str("<th>Change</th>");
    } else {
        let _ = write!(out, "<th>{}</th>", escape(&view.key_label));
    }
    out.push_str("</tr></thead>\n<tbody>\n");

    for row in &view.rows {
        let item = match row.link.as_deref().and_then(safe_href) {
            Some(href) => format!("<a href=\"{}\">{}</a>", href, escape(&row.id)),
            None => escape(&row.id),
        };
        let _ = write!(out, "<tr><td>{}</td><td>{}</td><td>{}</td>", row.rank, item, escape(&row.name));
        if view.has_price {
            let _ = write!(out, "<td>{}</td>", escape(&row.price));
        }
        if view.has_change {
            let _ = write!(
                out,
                "<td class=\"{}\">{}</td>",
                row.tone.css_class(),
                escape(&row.change)
            );
        } else {
            let _ = write!(out, "<td>{}</td>", row.key);
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n</section>\n");
}

fn analysis_section(out: &mut String, view: &AnalysisView) {
    out.push_str("<section>\n<h2>Stock analysis</h2>\n");
    chart(out, &view.chart);
    out.push_str(
        "<table>\n<thead><tr><th>Symbol</th><th>Name</th><th>Score</th>\
<th>Recommendation</th><th>Reason</th></tr></thead>\n<tbody>\n",
    );
    for row in &view.rows {
        let class = row.tone.css_class();
        let _ = write!(
            out,
            "<tr><td>{}</td><td>{}</td><td class=\"{class}\">{}/100</td>\
<td class=\"{class}\">{}</td><td>{}</td></tr>\n",
            escape(&row.symbol),
            escape(&row.name),
            row.score,
            escape(&row.recommendation),
            escape(&row.reason),
        );
    }
    out.push_str("</tbody>\n</table>\n</section>\n");
}

pub fn render_dashboard(view: &DashboardView) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
<title>{title}</title>\n<script src=\"{CHART_JS}\"></script>\n<style>{STYLE}</style>\n</head>\n\
<body>\n<div class=\"container\">\n<header><h1>{title}</h1><p>Generated {generated}</p></header>\n",
        title = escape(&view.title),
        generated = escape(&view.generated),
    );

    if view.categories.is_empty() {
        out.push_str("<section><p>No snapshots yet.</p></section>\n");
    }
    for category in &view.categories {
        category_section(&mut out, category);
    }
    if let Some(analysis) = &view.analysis {
        analysis_section(&mut out, analysis);
    }

    out.push_str("</div>\n</body>\n</html>\n");
    out
}

pub fn dashboard_path(docs_dir: &Path, source_id: &str) -> PathBuf {
    docs_dir.join(format!("{}_dashboard.html", source_id))
}

pub fn write_dashboard(docs_dir: &Path, source_id: &str, html: &str) -> Result<PathBuf, StoreError> {
    fs::create_dir_all(docs_dir).map_err(|e| StoreError::io(docs_dir, e))?;
    let path = dashboard_path(docs_dir, source_id);
    fs::write(&path, html).map_err(|e| StoreError::io(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::view::{TableRow, Tone, GREEN};

    fn view_with(id: &str, link: Option<&str>) -> DashboardView {
        DashboardView {
            title: "Robinhood Dashboard".into(),
            generated: "2026-03-09 09:00".into(),
            categories: vec![CategoryView {
                title: "Top <movers>".into(),
                date: "2026-03-09".into(),
                total_count: 1,
                key_label: "Rank".into(),
                has_price: true,
                has_change: true,
                chart: ChartSpec {
                    id: "top_movers_chart".into(),
                    title: "Top".into(),
                    value_label: "Change (%)".into(),
                    labels: vec![id.to_string()],
                    values: vec![1.5],
                    colors: vec![GREEN],
                },
                rows: vec![TableRow {
                    rank: 1,
                    id: id.to_string(),
                    name: "Acme & Sons".into(),
                    price: "10.00".into(),
                    change: "+1.5%".into(),
                    key: 0,
                    link: link.map(str::to_string),
                    tone: Tone::Positive,
                }],
            }],
            analysis: None,
        }
    }

    #[test]
    fn escapes_table_text() {
        let html = render_dashboard(&view_with("<b>X</b>", None));
        assert!(html.contains("&lt;b&gt;X&lt;/b&gt;"));
        assert!(html.contains("Acme &amp; Sons"));
        assert!(html.contains("Top &lt;movers&gt;"));
        assert!(!html.contains("<b>X</b>"));
    }

    #[test]
    fn script_payload_cannot_close_the_tag() {
        let html = render_dashboard(&view_with("</script><script>alert(1)", None));
        assert!(!html.contains("</script><script>alert(1)"));
        assert!(html.contains("<\\/script>"));
    }

    #[test]
    fn only_http_links_are_rendered() {
        let html = render_dashboard(&view_with("A", Some("javascript:alert(1)")));
        assert!(!html.contains("javascript:"));
        let html = render_dashboard(&view_with("A", Some("https://robinhood.com/stocks/A")));
        assert!(html.contains("<a href=\"https://robinhood.com/stocks/A\">A</a>"));
    }

    #[test]
    fn change_cells_get_tone_class() {
        let html = render_dashboard(&view_with("A", None));
        assert!(html.contains("<td class=\"positive\">+1.5%</td>"));
        assert!(html.contains("\"#4CAF50\""));
    }

    #[test]
    fn writes_into_docs_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("docs");
        let path = write_dashboard(&docs, "robinhood", "<html></html>").unwrap();
        assert!(path.ends_with("docs/robinhood_dashboard.html"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<html></html>");
    }
}
