use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Url;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::extract::{Extractor, ParsedDeal, SignalSet};
use crate::sources::{normalize_text, parse_url, resolve_url, HttpFetcher, SourceAdapter, SourceError, MIN_TITLE_CHARS};
use crate::store::types::IdentityStrategy;

/// XenForo thread list plus the older vBulletin layout
pub const DEFAULT_SELECTORS: &str = ".structItem-title a, .discussionListItem-title a, h3.title a";

/// Scans a forum board's thread titles for deals
pub struct ForumAdapter {
    name: String,
    page_url: String,
    base_url: Url,
    selector: Selector,
    extractor: Extractor,
    fetcher: HttpFetcher,
}

impl ForumAdapter {
    pub fn new(
        name: &str,
        page_url: &str,
        base_url: &str,
        selectors: &str,
        signals: SignalSet,
        fetcher: HttpFetcher,
    ) -> Result<Self, SourceError> {
        let selector = Selector::parse(selectors)
            .map_err(|e| SourceError::Selector(format!("{}: {:?}", selectors, e)))?;

        Ok(Self {
            name: name.to_string(),
            page_url: page_url.to_string(),
            base_url: parse_url(base_url)?,
            selector,
            extractor: Extractor::new(signals),
            fetcher,
        })
    }

    /// Parse thread links out of a board page
    pub fn parse_threads(&self, html: &str, today: NaiveDate) -> Vec<ParsedDeal> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut deals = Vec::new();

        for link in document.select(&self.selector) {
            let title = normalize_text(link.text());
            let Some(href) = link.value().attr("href") else {
                continue;
            };

            if title.chars().count() < MIN_TITLE_CHARS {
                continue;
            }

            let url = match resolve_url(&self.base_url, href) {
                Ok(url) => url,
                Err(e) => {
                    debug!("[{}] Skipping thread with bad link: {}", self.name, e);
                    continue;
                }
            };

            if !seen.insert(url.clone()) {
                continue;
            }

            // Only the title is checked for signals; the description is synthesized
            if let Some(deal) = self.extractor.extract(&title, "", &url, today) {
                let description = format!("Community-shared deal from {}: {}", self.name, title);
                deals.push(deal.with_description(&description));
            }
        }

        deals
    }
}

#[async_trait]
impl SourceAdapter for ForumAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> IdentityStrategy {
        IdentityStrategy::Url
    }

    async fn collect(&self) -> Result<Vec<ParsedDeal>, SourceError> {
        info!("[{}] Starting aggregation...", self.name);

        let html = self.fetcher.get_text(&self.page_url).await?;
        let deals = self.parse_threads(&html, Utc::now().date_naive());

        info!("[{}] Found {} potential deals", self.name, deals.len());
        Ok(deals)
    }
}
