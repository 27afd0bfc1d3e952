pub mod blog;
pub mod forum;
pub mod http;
pub mod listing;

use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;

use crate::config::{SourceConfig, SourceKind};
use crate::extract::{ParsedDeal, SignalSet};
use crate::store::types::IdentityStrategy;

pub use blog::BlogAdapter;
pub use forum::ForumAdapter;
pub use http::HttpFetcher;
pub use listing::ListingAdapter;

/// Minimum title length worth handing to the extractor
pub const MIN_TITLE_CHARS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error! status: {status} ({url})")]
    Status { url: String, status: u16 },

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("Invalid URL: {0}")]
    Url(String),

    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid signal pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// One external origin's fetch-and-extract pipeline
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Name matching the source's row in the store
    fn name(&self) -> &str;

    /// How the repository recognises a deal it has already stored
    fn identity(&self) -> IdentityStrategy;

    /// Fetch the source and return well-formed candidate deals
    async fn collect(&self) -> Result<Vec<ParsedDeal>, SourceError>;
}

pub(crate) fn parse_url(raw: &str) -> Result<Url, SourceError> {
    Url::parse(raw).map_err(|e| SourceError::Url(format!("{}: {}", raw, e)))
}

/// Resolve a possibly relative link against the source's base
pub(crate) fn resolve_url(base: &Url, href: &str) -> Result<String, SourceError> {
    base.join(href)
        .map(|url| url.to_string())
        .map_err(|e| SourceError::Url(format!("{}: {}", href, e)))
}

/// Collapse runs of whitespace the way a browser renders text
pub(crate) fn normalize_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn signals_for(config: &SourceConfig, fallback: SignalSet) -> Result<SignalSet, SourceError> {
    if config.keywords.is_empty() && config.patterns.is_empty() {
        Ok(fallback)
    } else {
        Ok(SignalSet::from_config(&config.keywords, &config.patterns)?)
    }
}

/// Build one adapter per enabled `[[sources]]` entry
pub fn build_adapters(
    sources: &[SourceConfig],
    fetcher: &HttpFetcher,
) -> Result<Vec<Arc<dyn SourceAdapter>>, SourceError> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    for source in sources.iter().filter(|s| s.enabled) {
        let base_url = source.base_url.as_deref().unwrap_or(&source.url);

        let adapter: Arc<dyn SourceAdapter> = match source.kind {
            SourceKind::Forum => Arc::new(ForumAdapter::new(
                &source.name,
                &source.url,
                base_url,
                source.selectors.as_deref().unwrap_or(forum::DEFAULT_SELECTORS),
                signals_for(source, SignalSet::forum())?,
                fetcher.clone(),
            )?),
            SourceKind::Blog => Arc::new(BlogAdapter::new(
                &source.name,
                &source.url,
                source.selectors.as_deref().unwrap_or(blog::DEFAULT_CONTAINERS),
                signals_for(source, SignalSet::forum())?,
                fetcher.clone(),
            )?),
            SourceKind::Listing => Arc::new(ListingAdapter::new(
                &source.name,
                &source.url,
                base_url,
                signals_for(source, SignalSet::forum())?,
                fetcher.clone(),
            )?),
        };

        tracing::debug!("Configured {:?} adapter: {}", source.kind, source.name);
        adapters.push(adapter);
    }

    Ok(adapters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str, kind: SourceKind, enabled: bool) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            kind,
            url: "https://example.com/deals/".to_string(),
            base_url: None,
            selectors: None,
            keywords: Vec::new(),
            patterns: Vec::new(),
            enabled,
        }
    }

    #[test]
    fn test_resolve_url() {
        let base = parse_url("https://www.disboards.com/forums/budget-board.91/").unwrap();
        assert_eq!(
            resolve_url(&base, "/threads/free-dining.123/").unwrap(),
            "https://www.disboards.com/threads/free-dining.123/"
        );
        assert_eq!(
            resolve_url(&base, "https://other.example/x").unwrap(),
            "https://other.example/x"
        );
    }

    #[test]
    fn test_normalize_text() {
        let text = normalize_text(["  Free\n dining ", "\tis back  "].into_iter());
        assert_eq!(text, "Free dining is back");
    }

    #[test]
    fn test_build_adapters_skips_disabled() {
        let fetcher = HttpFetcher::new(http::DEFAULT_USER_AGENT, std::time::Duration::from_secs(5)).unwrap();
        let sources = vec![
            source("DISboards", SourceKind::Forum, true),
            source("MouseSavers", SourceKind::Blog, false),
            source("Reddit", SourceKind::Listing, true),
        ];

        let adapters = build_adapters(&sources, &fetcher).unwrap();
        let names: Vec<_> = adapters.iter().map(|a| a.name().to_string()).collect();

        assert_eq!(names, vec!["DISboards", "Reddit"]);
        assert_eq!(adapters[0].identity(), IdentityStrategy::Url);
    }

    #[test]
    fn test_build_adapters_rejects_bad_pattern() {
        let fetcher = HttpFetcher::new(http::DEFAULT_USER_AGENT, std::time::Duration::from_secs(5)).unwrap();
        let mut bad = source("DISboards", SourceKind::Forum, true);
        bad.patterns = vec!["(".to_string()];

        assert!(matches!(
            build_adapters(&[bad], &fetcher),
            Err(SourceError::Pattern(_))
        ));
    }
}
