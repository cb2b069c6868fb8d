//! Catalogue of the listing sites the crawler knows about.

use crate::error::ConfigError;
use crate::extract::{FieldRule, FieldSchema, JsonField};
use crate::normalize::{KeyParser, SortKeyRule};
use crate::snapshot::SnapshotKey;

const GITHUB_LANGUAGES: [&str; 13] = [
    "all",
    "python",
    "javascript",
    "typescript",
    "go",
    "rust",
    "java",
    "c",
    "cpp",
    "csharp",
    "php",
    "ruby",
    "swift",
];
const GITHUB_PERIODS: [&str; 3] = ["daily", "weekly", "monthly"];
const HN_API: &str = "https://hacker-news.firebaseio.com/v0";

#[derive(Debug, Clone)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub url: String,
    pub period: Option<String>,
}

impl Category {
    fn new(id: &str, name: &str, url: &str) -> Self {
        Category {
            id: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            period: None,
        }
    }
}

/// Which record fields a dashboard shows.
#[derive(Debug, Clone)]
pub struct RenderProfile {
    pub id_field: String,
    pub name_field: String,
    pub price_field: Option<String>,
    /// Signed percentage; drives colours when present.
    pub change_field: Option<String>,
    pub link_field: Option<String>,
    /// Caption for the sort key column and chart.
    pub key_label: String,
}

#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub id: String,
    pub title: String,
    /// Collection name in snapshot files.
    pub item_label: String,
    pub categories: Vec<Category>,
    pub schema: FieldSchema,
    pub sort_rule: SortKeyRule,
    pub limit: usize,
    pub render: RenderProfile,
    /// Stock sources get the LLM analysis step.
    pub analyzable: bool,
}

impl SourceSpec {
    pub fn key(&self, category: &Category) -> SnapshotKey {
        SnapshotKey::new(&self.id, &category.id, category.period.as_deref())
    }

    /// Rendered pages need the hosted crawler.
    pub fn needs_crawler(&self) -> bool {
        matches!(self.schema, FieldSchema::Css { .. })
    }
}

pub fn catalogue() -> Vec<SourceSpec> {
    vec![alibaba(), robinhood(), github(), hackernews(), producthunt()]
}

/// All sources, or the one named.
pub fn select(catalogue: Vec<SourceSpec>, id: Option<&str>) -> Result<Vec<SourceSpec>, ConfigError> {
    match id {
        None => Ok(catalogue),
        Some(id) => {
            let found: Vec<SourceSpec> = catalogue.into_iter().filter(|s| s.id == id).collect();
            if found.is_empty() {
                Err(ConfigError::UnknownSource(id.to_string()))
            } else {
                Ok(found)
            }
        }
    }
}

fn alibaba() -> SourceSpec {
    let url = |cat: &str| {
        format!(
            "https://s.1688.com/selloffer/offer_search.htm?sortType=va_sales&cat={}",
            cat
        )
    };
    SourceSpec {
        id: "1688".into(),
        title: "1688".into(),
        item_label: "products".into(),
        categories: vec![
            Category::new("1037039", "服装", &url("1037039")),
            Category::new("1031704", "家居", &url("1031704")),
            Category::new("1050009", "数码", &url("1050009")),
        ],
        schema: FieldSchema::Css {
            base_selector: ".offer-list, .sm-offer-list, .grid-offer, .offer-item".into(),
            fields: vec![
                FieldRule::text("product_name", ".title, .offer-title, .title-text"),
                FieldRule::link("product_url", ".title a, .offer-title a, a.title-link", "href"),
                FieldRule::text("price", ".price, .offer-price, .price-text"),
                FieldRule::text("sales", ".sale-quantity, .sales, .volume"),
                FieldRule::text("shop_name", ".company-name, .shop-name, .supplier-name"),
                FieldRule::link("shop_url", ".company-name a, .shop-name a, .supplier-link", "href"),
                FieldRule::text("rating", ".star-rating, .rating, .rate"),
            ],
        },
        sort_rule: SortKeyRule::new("sales", KeyParser::CountWithUnit),
        limit: 100,
        render: RenderProfile {
            id_field: "product_name".into(),
            name_field: "shop_name".into(),
            price_field: Some("price".into()),
            change_field: None,
            link_field: Some("product_url".into()),
            key_label: "Sales".into(),
        },
        analyzable: false,
    }
}

fn robinhood() -> SourceSpec {
    SourceSpec {
        id: "robinhood".into(),
        title: "Robinhood".into(),
        item_label: "stocks".into(),
        categories: vec![
            Category::new(
                "most_popular",
                "最受欢迎股票",
                "https://robinhood.com/collections/100-most-popular",
            ),
            Category::new(
                "top_movers",
                "涨跌幅最大股票",
                "https://robinhood.com/collections/top-movers",
            ),
            Category::new(
                "tech_stocks",
                "科技股",
                "https://robinhood.com/collections/technology",
            ),
            Category::new(
                "growth_stocks",
                "成长股",
                "https://robinhood.com/collections/growth-stocks",
            ),
        ],
        schema: FieldSchema::Css {
            base_selector: ".rh-hyperlink, [data-testid='stock-card'], [data-testid='stock-item'], \
.instrument-card, .stock-card, .list-item, .stock-list-item"
                .into(),
            fields: vec![
                FieldRule::text("stock_symbol", ".symbol, [data-testid='symbol'], .ticker, .ticker-symbol"),
                FieldRule::text("stock_name", ".company-name, [data-testid='name'], .name, .stock-name"),
                FieldRule::text("stock_price", ".price, [data-testid='price'], .current-price, .stock-price"),
                FieldRule::text(
                    "price_change",
                    ".price-change, [data-testid='price-change'], .change, .stock-change",
                ),
                FieldRule::text(
                    "percent_change",
                    ".percent-change, [data-testid='percent-change'], .change-percent, .stock-percent",
                ),
                FieldRule::link("stock_url", "a", "href"),
                FieldRule::text("market_cap", ".market-cap, [data-testid='market-cap'], .cap"),
                FieldRule::text("volume", ".volume, [data-testid='volume']"),
            ],
        },
        // Listing order is the site's own ranking.
        sort_rule: SortKeyRule::new("stock_symbol", KeyParser::Presence),
        limit: 100,
        render: RenderProfile {
            id_field: "stock_symbol".into(),
            name_field: "stock_name".into(),
            price_field: Some("stock_price".into()),
            change_field: Some("percent_change".into()),
            link_field: Some("stock_url".into()),
            key_label: "Rank".into(),
        },
        analyzable: true,
    }
}

fn github() -> SourceSpec {
    let categories = GITHUB_LANGUAGES
        .iter()
        .flat_map(|lang| {
            GITHUB_PERIODS.iter().map(move |period| Category {
                id: lang.to_string(),
                name: format!("{} ({})", lang, period),
                url: format!(
                    "https://github-trending-api.vercel.app/repositories?language={}&since={}",
                    lang, period
                ),
                period: Some(period.to_string()),
            })
        })
        .collect();

    SourceSpec {
        id: "github".into(),
        title: "GitHub Trending".into(),
        item_label: "repositories".into(),
        categories,
        schema: FieldSchema::JsonArray {
            fields: vec![
                JsonField::new("author", "author"),
                JsonField::new("name", "name"),
                JsonField::new("url", "url"),
                JsonField::new("description", "description"),
                JsonField::new("language", "language"),
                JsonField::new("stars", "stars"),
                JsonField::new("forks", "forks"),
                JsonField::new("current_period_stars", "currentPeriodStars"),
            ],
        },
        sort_rule: SortKeyRule::new("current_period_stars", KeyParser::Count),
        limit: 100,
        render: RenderProfile {
            id_field: "name".into(),
            name_field: "author".into(),
            price_field: Some("stars".into()),
            change_field: None,
            link_field: Some("url".into()),
            key_label: "Stars gained".into(),
        },
        analyzable: false,
    }
}

fn hackernews() -> SourceSpec {
    SourceSpec {
        id: "hackernews".into(),
        title: "HackerNews".into(),
        item_label: "stories".into(),
        categories: vec![Category::new(
            "top",
            "Top stories",
            &format!("{}/topstories.json", HN_API),
        )],
        schema: FieldSchema::IdFanout {
            item_url: format!("{}/item/{{id}}.json", HN_API),
            limit: 100,
            fields: vec![
                JsonField::new("id", "id"),
                JsonField::new("title", "title"),
                JsonField::new("url", "url"),
                JsonField::new("by", "by"),
                JsonField::new("score", "score"),
                JsonField::new("descendants", "descendants"),
                JsonField::new("time", "time"),
            ],
        },
        sort_rule: SortKeyRule::new("score", KeyParser::Count),
        limit: 100,
        render: RenderProfile {
            id_field: "title".into(),
            name_field: "by".into(),
            price_field: Some("descendants".into()),
            change_field: None,
            link_field: Some("url".into()),
            key_label: "Score".into(),
        },
        analyzable: false,
    }
}

fn producthunt() -> SourceSpec {
    SourceSpec {
        id: "producthunt".into(),
        title: "ProductHunt".into(),
        item_label: "products".into(),
        categories: vec![Category::new(
            "daily",
            "Today's products",
            "https://www.producthunt.com/",
        )],
        schema: FieldSchema::Css {
            base_selector: "[data-test='product-item'], .product-item, .post-item, .post".into(),
            fields: vec![
                FieldRule::text("product_name", "h3, .product-name, .post-name, .title"),
                FieldRule::text(
                    "product_description",
                    "p, .product-description, .post-description, .description",
                ),
                FieldRule::link("product_url", "a[href*='/posts/']", "href"),
                FieldRule::text(
                    "upvotes",
                    ".vote-button, .upvote-button, [data-test='vote-button'], [data-test='upvote-count']",
                ),
                FieldRule::link("product_image", "img", "src"),
                FieldRule::text("maker_name", ".maker-name, .user-name, [data-test='maker-name']"),
            ],
        },
        sort_rule: SortKeyRule::new("upvotes", KeyParser::Count),
        limit: 50,
        render: RenderProfile {
            id_field: "product_name".into(),
            name_field: "maker_name".into(),
            price_field: None,
            change_field: None,
            link_field: Some("product_url".into()),
            key_label: "Upvotes".into(),
        },
        analyzable: false,
    }
}
