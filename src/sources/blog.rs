use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::info;

use crate::extract::{truncate_chars, Extractor, ParsedDeal, SignalSet, MAX_DESCRIPTION_CHARS};
use crate::sources::{normalize_text, parse_url, HttpFetcher, SourceAdapter, SourceError, MIN_TITLE_CHARS};
use crate::store::types::IdentityStrategy;

pub const DEFAULT_CONTAINERS: &str = "article, .entry-content, .post-content";

const HEADINGS: &str = "h2, h3, h4, strong";
const MAX_HEADING_CHARS: usize = 200;
const MAX_FOLLOWING_SIBLINGS: usize = 3;
const MIN_DESCRIPTION_CHARS: usize = 20;

/// Scans blog articles where a deal is a heading followed by body paragraphs
pub struct BlogAdapter {
    name: String,
    page_url: String,
    containers: Selector,
    headings: Selector,
    article_signals: SignalSet,
    extractor: Extractor,
    fetcher: HttpFetcher,
}

impl BlogAdapter {
    pub fn new(
        name: &str,
        page_url: &str,
        containers: &str,
        signals: SignalSet,
        fetcher: HttpFetcher,
    ) -> Result<Self, SourceError> {
        parse_url(page_url)?;

        let containers = Selector::parse(containers)
            .map_err(|e| SourceError::Selector(format!("{}: {:?}", containers, e)))?;
        let headings = Selector::parse(HEADINGS)
            .map_err(|e| SourceError::Selector(format!("{}: {:?}", HEADINGS, e)))?;

        Ok(Self {
            name: name.to_string(),
            page_url: page_url.to_string(),
            containers,
            headings,
            article_signals: SignalSet::blog(),
            extractor: Extractor::new(signals),
            fetcher,
        })
    }

    /// Parse heading-delimited deals out of article containers
    pub fn parse_articles(&self, html: &str, today: NaiveDate) -> Vec<ParsedDeal> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut deals = Vec::new();

        for container in document.select(&self.containers) {
            let text = normalize_text(container.text());
            if !self.article_signals.matches(&text) {
                continue;
            }

            for heading in container.select(&self.headings) {
                let title = normalize_text(heading.text());
                let title_chars = title.chars().count();
                if title_chars < MIN_TITLE_CHARS || title_chars > MAX_HEADING_CHARS {
                    continue;
                }

                let description = truncate_chars(&following_text(heading), MAX_DESCRIPTION_CHARS);
                if description.chars().count() < MIN_DESCRIPTION_CHARS {
                    continue;
                }

                // Nested containers surface the same heading twice
                if !seen.insert(title.clone()) {
                    continue;
                }

                if let Some(deal) = self.extractor.extract(&title, &description, &self.page_url, today) {
                    deals.push(deal);
                }
            }
        }

        deals
    }
}

/// Text of the element siblings after a heading, up to the next heading
fn following_text(heading: ElementRef<'_>) -> String {
    let parts: Vec<String> = heading
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .take_while(|sibling| !matches!(sibling.value().name(), "h2" | "h3" | "h4"))
        .take(MAX_FOLLOWING_SIBLINGS)
        .map(|sibling| normalize_text(sibling.text()))
        .filter(|text| !text.is_empty())
        .collect();

    parts.join(" ")
}

#[async_trait]
impl SourceAdapter for BlogAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> IdentityStrategy {
        // Every deal on the page shares the page URL
        IdentityStrategy::TitleAndSource
    }

    async fn collect(&self) -> Result<Vec<ParsedDeal>, SourceError> {
        info!("[{}] Starting aggregation...", self.name);

        let html = self.fetcher.get_text(&self.page_url).await?;
        let deals = self.parse_articles(&html, Utc::now().date_naive());

        info!("[{}] Found {} potential deals", self.name, deals.len());
        Ok(deals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::DealType;
    use crate::sources::http::DEFAULT_USER_AGENT;
    use std::time::Duration;

    const PAGE_URL: &str = "https://www.mousesavers.com/disney-world-vacation-discounts/";

    const PAGE: &str = r#"
        <html><body>
          <article>
            <div class="entry-content">
              <h2>Free Dining with Vacation Packages</h2>
              <p>Book a package by June 30 and get the dining plan free.</p>
              <p>Valid for arrivals July 4 through August 20, 2026.</p>
              <h3>Up to 30% off Room Discount</h3>
              <p>Save up to 30% on rooms at select resorts.</p>
              <p>Use code: SUMMER30 when booking.</p>
              <p>Not available for all rooms.</p>
              <p>This fourth paragraph is beyond the sibling cap 99% off.</p>
              <h3>Ticket information ahead</h3>
              <h4>Short body heading</h4>
              <p>Too short.</p>
            </div>
          </article>
          <div class="post-content">
            <h2>Park hours for the holidays</h2>
            <p>Magic Kingdom opens at 8am throughout December.</p>
          </div>
        </body></html>
    "#;

    fn adapter() -> BlogAdapter {
        BlogAdapter::new(
            "MouseSavers",
            PAGE_URL,
            DEFAULT_CONTAINERS,
            SignalSet::forum(),
            HttpFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(5)).unwrap(),
        )
        .unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    #[test]
    fn test_parse_articles() {
        let deals = adapter().parse_articles(PAGE, today());

        assert_eq!(deals.len(), 2);

        let dining = &deals[0];
        assert_eq!(dining.title, "Free Dining with Vacation Packages");
        assert_eq!(dining.deal_type, DealType::FreeDining);
        assert_eq!(dining.source_url, PAGE_URL);
        assert_eq!(dining.valid_from, NaiveDate::from_ymd_opt(2026, 7, 4).unwrap());
        assert_eq!(dining.valid_to, NaiveDate::from_ymd_opt(2026, 8, 20).unwrap());

        let rooms = &deals[1];
        assert_eq!(rooms.deal_type, DealType::RoomDiscount);
        assert_eq!(rooms.discount_percentage, Some(30.0));
        assert_eq!(rooms.deal_code.as_deref(), Some("SUMMER30"));
        assert!(!rooms.description.contains("fourth paragraph"));
    }

    #[test]
    fn test_following_text_stops_at_next_heading() {
        let html = Html::parse_fragment("<div><h3>First heading here</h3><p>one</p><p>two</p><h3>Next</h3><p>three</p></div>");
        let selector = Selector::parse("h3").unwrap();
        let heading = html.select(&selector).next().unwrap();

        assert_eq!(following_text(heading), "one two");
    }

    #[test]
    fn test_article_without_signal_is_skipped() {
        let html = r#"<article><h2>Park hours for the holidays</h2><p>Magic Kingdom opens early with a special deal.</p></article>"#;
        assert!(adapter().parse_articles(html, today()).is_empty());
    }
}
