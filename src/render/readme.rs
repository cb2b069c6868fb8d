//! `## {Source} Data` link sections in the README.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::warn;

use crate::error::StoreError;
use crate::settings::Settings;
use crate::snapshot::{SnapshotStore, DATE_FORMAT};
use crate::sources::SourceSpec;

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^## .*$").unwrap());

const DATA_LINKS_HEADING: &str = "## Data Links";

#[derive(Debug, Clone, PartialEq)]
pub struct ReadmeLink {
    pub label: String,
    pub target: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadmeSection {
    pub title: String,
    pub links: Vec<ReadmeLink>,
    pub dashboard_url: String,
}

impl ReadmeSection {
    pub fn heading(&self) -> String {
        format!("## {} Data", self.title)
    }
}

fn md_text(text: &str) -> String {
    text.replace('[', "\\[").replace(']', "\\]")
}

fn join_url(base: &str, rest: &str) -> String {
    if base.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), rest)
    }
}

/// Forward-slash form of the path's named components, for links.
fn relative(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            Component::ParentDir => Some("..".into()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Latest file per category (and the latest analysis, for stock sources).
/// A category whose directory cannot be listed is logged and left out.
pub fn collect_section(store: &SnapshotStore, source: &SourceSpec, settings: &Settings) -> ReadmeSection {
    let data_prefix = relative(&settings.data_dir.join(&source.id));
    let file_link = |path: &Path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        join_url(&settings.repo_blob_url, &format!("{}/{}", data_prefix, name))
    };

    let mut links = Vec::new();
    let mut push = |label: String, found: Result<Option<(NaiveDate, PathBuf)>, StoreError>| match found {
        Ok(Some((date, path))) => links.push(ReadmeLink {
            label,
            target: file_link(&path),
            date,
        }),
        Ok(None) => {}
        Err(e) => warn!(source = %source.id, link = %label, error = %e, "skipping README link"),
    };

    for category in &source.categories {
        push(
            format!("{} Data", category.name),
            store.latest_file(&source.key(category)),
        );
    }
    if source.analyzable {
        push(
            "Stock Analysis Results".to_string(),
            store.latest_analysis_file(&source.id),
        );
    }

    ReadmeSection {
        title: source.title.clone(),
        links,
        dashboard_url: join_url(&settings.pages_url, &format!("{}_dashboard.html", source.id)),
    }
}

pub fn render_section(section: &ReadmeSection) -> String {
    let mut out = format!("{}\n\n", section.heading());
    if section.links.is_empty() {
        out.push_str("No data collected yet.\n");
    } else {
        let _ = writeln!(out, "Latest {} snapshots:\n", md_text(&section.title));
        for link in &section.links {
            let _ = writeln!(
                out,
                "* [{}]({}) - Updated: {}",
                md_text(&link.label),
                link.target,
                link.date.format(DATE_FORMAT)
            );
        }
    }
    let _ = writeln!(out, "* [{} Dashboard]({})", md_text(&section.title), section.dashboard_url);
    out
}

/// Replace the section under `heading` (up to the next `## ` heading), or add it
/// after the last `## ... Data` section, else after Data Links, else at the end.
pub fn upsert_section(content: &str, heading: &str, body: &str) -> String {
    let headings: Vec<(usize, &str)> = HEADING_RE
        .find_iter(content)
        .map(|m| (m.start(), m.as_str().trim_end()))
        .collect();
    let section_end = |start: usize| {
        headings
            .iter()
            .map(|(pos, _)| *pos)
            .find(|pos| *pos > start)
            .unwrap_or(content.len())
    };
    let body = body.trim_end();

    if let Some(&(start, _)) = headings.iter().find(|(_, h)| *h == heading) {
        let end = section_end(start);
        let tail = &content[end..];
        let sep = if tail.is_empty() { "\n" } else { "\n\n" };
        return format!("{}{}{}{}", &content[..start], body, sep, tail);
    }

    let anchor = headings
        .iter()
        .rev()
        .find(|(_, h)| h.ends_with(" Data"))
        .or_else(|| headings.iter().find(|(_, h)| *h == DATA_LINKS_HEADING));
    if let Some(&(start, _)) = anchor {
        let end = section_end(start);
        let (head, tail) = content.split_at(end);
        let sep = if tail.is_empty() { "\n" } else { "\n\n" };
        return format!("{}\n\n{}{}{}", head.trim_end(), body, sep, tail);
    }

    if content.trim().is_empty() {
        format!("{}\n", body)
    } else {
        format!("{}\n\n{}\n", content.trim_end(), body)
    }
}

/// Rewrite the README with every section upserted. A missing README is created.
pub fn update_readme(path: &Path, sections: &[ReadmeSection]) -> Result<(), StoreError> {
    let mut content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    for section in sections {
        content = upsert_section(&content, &section.heading(), &render_section(section));
    }
    fs::write(path, content).map_err(|e| StoreError::io(path, e))
}
