use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::extract::{Extractor, ParsedDeal, SignalSet};
use crate::sources::{normalize_text, parse_url, resolve_url, HttpFetcher, SourceAdapter, SourceError, MIN_TITLE_CHARS};
use crate::store::types::IdentityStrategy;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    title: String,
    #[serde(default)]
    selftext: String,
    permalink: String,
}

/// Reads a JSON post listing (subreddit search results)
pub struct ListingAdapter {
    name: String,
    listing_url: String,
    base_url: Url,
    extractor: Extractor,
    fetcher: HttpFetcher,
}

impl ListingAdapter {
    pub fn new(
        name: &str,
        listing_url: &str,
        base_url: &str,
        signals: SignalSet,
        fetcher: HttpFetcher,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            name: name.to_string(),
            listing_url: listing_url.to_string(),
            base_url: parse_url(base_url)?,
            extractor: Extractor::new(signals),
            fetcher,
        })
    }

    /// Parse posts out of a listing body. Malformed JSON fails the run.
    pub fn parse_listing(&self, body: &str, today: NaiveDate) -> Result<Vec<ParsedDeal>, SourceError> {
        let listing: Listing = serde_json::from_str(body)?;
        let mut seen = HashSet::new();
        let mut deals = Vec::new();

        for child in listing.data.children {
            let post = child.data;
            let title = normalize_text(post.title.split_whitespace());
            if title.chars().count() < MIN_TITLE_CHARS {
                continue;
            }

            let url = match resolve_url(&self.base_url, &post.permalink) {
                Ok(url) => url,
                Err(e) => {
                    debug!("[{}] Skipping post with bad permalink: {}", self.name, e);
                    continue;
                }
            };

            if !seen.insert(url.clone()) {
                continue;
            }

            let body = normalize_text(post.selftext.split_whitespace());

            // Post bodies ramble; gate on the title alone
            let Some(deal) = self.extractor.extract_gated(&title, &title, &body, &url, today) else {
                continue;
            };

            if body.is_empty() {
                deals.push(deal.with_description(&format!("Community-shared deal from {}: {}", self.name, title)));
            } else {
                deals.push(deal);
            }
        }

        Ok(deals)
    }
}

#[async_trait]
impl SourceAdapter for ListingAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> IdentityStrategy {
        IdentityStrategy::Url
    }

    async fn collect(&self) -> Result<Vec<ParsedDeal>, SourceError> {
        info!("[{}] Starting aggregation...", self.name);

        let body = self.fetcher.get_text(&self.listing_url).await?;
        let deals = self.parse_listing(&body, Utc::now().date_naive())?;

        info!("[{}] Found {} potential deals", self.name, deals.len());
        Ok(deals)
    }
}
