//! Schema application over rendered HTML.

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use super::{FieldKind, FieldRule, RawRecord};
use crate::error::FetchError;

struct CompiledRule<'a> {
    rule: &'a FieldRule,
    selector: Selector,
}

fn compile(selector: &str) -> Result<Selector, FetchError> {
    Selector::parse(selector)
        .map_err(|e| FetchError::Parse(format!("bad selector '{}': {}", selector, e)))
}

/// One record per `base_selector` match, in document order.
///
/// A field whose selector matches nothing inside the base element is `None`.
pub fn apply_schema(
    html: &str,
    base_selector: &str,
    fields: &[FieldRule],
    page_url: &str,
) -> Result<Vec<RawRecord>, FetchError> {
    let base = compile(base_selector)?;
    let rules = fields
        .iter()
        .map(|rule| {
            Ok(CompiledRule {
                rule,
                selector: compile(&rule.selector)?,
            })
        })
        .collect::<Result<Vec<_>, FetchError>>()?;

    let page = Url::parse(page_url).ok();
    let document = Html::parse_document(html);

    let records = document
        .select(&base)
        .map(|element| {
            rules
                .iter()
                .map(|c| {
                    let value = element
                        .select(&c.selector)
                        .next()
                        .and_then(|hit| read_field(hit, &c.rule.kind, page.as_ref()));
                    (c.rule.name.clone(), value)
                })
                .collect::<RawRecord>()
        })
        .collect();

    Ok(records)
}

fn read_field(el: ElementRef<'_>, kind: &FieldKind, page: Option<&Url>) -> Option<String> {
    match kind {
        FieldKind::Text => {
            let text = el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ");
            (!text.is_empty()).then_some(text)
        }
        FieldKind::Attribute(name) => el.value().attr(name).map(str::to_string),
        FieldKind::Link(name) => {
            let raw = el.value().attr(name)?.trim();
            Some(resolve(raw, page))
        }
    }
}

/// Absolute URLs pass through; relative ones are joined onto the page URL.
pub fn resolve(href: &str, page: Option<&Url>) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    page.and_then(|base| base.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <div class="offer-item">
            <a class="title" href="/offer/1.html">  Linen   shirt </a>
            <span class="price">¥39.00</span>
            <span class="sales">2.5万+</span>
          </div>
          <div class="offer-item">
            <a class="title" href="https://detail.1688.com/offer/2.html">Cotton socks</a>
            <span class="price">¥3.50</span>
          </div>
        </body></html>
    "#;

    fn fields() -> Vec<FieldRule> {
        vec![
            FieldRule::text("product_name", ".title"),
            FieldRule::link("product_url", "a.title", "href"),
            FieldRule::text("price", ".price, .offer-price"),
            FieldRule::text("sales", ".sales, .sale-quantity"),
            FieldRule::attr("raw_href", "a.title", "href"),
        ]
    }

    #[test]
    fn extracts_in_document_order() {
        let records =
            apply_schema(LISTING, ".offer-item", &fields(), "https://s.1688.com/search").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["product_name"].as_deref(), Some("Linen shirt"));
        assert_eq!(records[0]["sales"].as_deref(), Some("2.5万+"));
        assert_eq!(records[1]["product_name"].as_deref(), Some("Cotton socks"));
    }

    #[test]
    fn missing_field_is_none() {
        let records =
            apply_schema(LISTING, ".offer-item", &fields(), "https://s.1688.com/search").unwrap();
        assert_eq!(records[1]["sales"], None);
    }

    #[test]
    fn links_are_resolved() {
        let records =
            apply_schema(LISTING, ".offer-item", &fields(), "https://s.1688.com/search").unwrap();
        assert_eq!(
            records[0]["product_url"].as_deref(),
            Some("https://s.1688.com/offer/1.html")
        );
        assert_eq!(records[0]["raw_href"].as_deref(), Some("/offer/1.html"));
        assert_eq!(
            records[1]["product_url"].as_deref(),
            Some("https://detail.1688.com/offer/2.html")
        );
    }

    #[test]
    fn no_match_is_empty_not_error() {
        let records = apply_schema(LISTING, ".grid-offer", &fields(), "https://x.test").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn bad_selector_is_parse_failure() {
        let err = apply_schema(LISTING, "div[[", &fields(), "https://x.test").unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[test]
    fn resolve_without_base_keeps_href() {
        assert_eq!(resolve("/posts/x", None), "/posts/x");
        let base = Url::parse("https://www.producthunt.com/").unwrap();
        assert_eq!(
            resolve("/posts/x", Some(&base)),
            "https://www.producthunt.com/posts/x"
        );
    }
}
