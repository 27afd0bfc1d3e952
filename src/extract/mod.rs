pub mod classify;
pub mod dates;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub use classify::{classify, DealType};
pub use dates::{DateMatch, DateRange, DateRangeParser, ResolvedDates};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 500;

static DISCOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)%\s*(?:off|discount|savings)").expect("discount pattern is valid")
});

static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)code[:\s]+([A-Z0-9]+)").expect("code pattern is valid"));

const FORUM_KEYWORDS: &[&str] = &[
    "discount", "off", "save", "deal", "offer", "promo", "free dining",
    "room rate", "passholder", "code", "special", "%", "price",
];

const BLOG_PATTERNS: &[&str] = &[
    r"(?i)\d+%\s*off",
    r"(?i)save\s+up\s+to\s+\d+%",
    r"(?i)room\s+discount",
    r"(?i)special\s+offer",
    r"(?i)free\s+dining",
];

/// A candidate deal ready for the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDeal {
    pub title: String,
    pub description: String,
    pub deal_type: DealType,
    pub discount_percentage: Option<f64>,
    pub deal_code: Option<String>,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub travel_valid_from: NaiveDate,
    pub travel_valid_to: NaiveDate,
    /// Validity dates are the 90-day default rather than parsed from the text
    pub dates_inferred: bool,
    pub source_url: String,
}

impl ParsedDeal {
    /// Replace the description, keeping the length cap
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = truncate_chars(description, MAX_DESCRIPTION_CHARS);
        self
    }
}

/// Triggers that mark text as deal-like
#[derive(Debug, Clone)]
pub struct SignalSet {
    keywords: Vec<String>,
    patterns: Vec<Regex>,
}

impl SignalSet {
    pub fn new(keywords: Vec<String>, patterns: Vec<Regex>) -> Self {
        Self {
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
            patterns,
        }
    }

    pub fn from_config(keywords: &[String], patterns: &[String]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(keywords.to_vec(), patterns))
    }

    /// Substring keywords used on forum thread titles
    pub fn forum() -> Self {
        Self::new(FORUM_KEYWORDS.iter().map(|k| k.to_string()).collect(), Vec::new())
    }

    /// Regex triggers used to qualify whole blog articles
    pub fn blog() -> Self {
        let patterns = BLOG_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("blog pattern is valid"))
            .collect();
        Self::new(Vec::new(), patterns)
    }

    pub fn matches(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
            || self.patterns.iter().any(|p| p.is_match(text))
    }
}

/// Turns free text into a structured deal
pub struct Extractor {
    signals: SignalSet,
    date_parsers: Vec<Box<dyn DateRangeParser>>,
}

impl Extractor {
    pub fn new(signals: SignalSet) -> Self {
        Self {
            signals,
            date_parsers: dates::default_parsers(),
        }
    }

    /// Extract a deal from a title and its body text.
    ///
    /// Returns `None` when the combined text carries no deal signal. Patterns run
    /// against the full text; truncation happens last.
    pub fn extract(
        &self,
        title: &str,
        description: &str,
        source_url: &str,
        today: NaiveDate,
    ) -> Option<ParsedDeal> {
        let combined = format!("{} {}", title, description);
        if !self.signals.matches(combined.trim()) {
            return None;
        }
        Some(self.build(title, description, source_url, today))
    }

    /// Like [`Extractor::extract`], but only `gate` decides whether the text is a deal.
    /// Patterns still run against the title and description together.
    pub fn extract_gated(
        &self,
        gate: &str,
        title: &str,
        description: &str,
        source_url: &str,
        today: NaiveDate,
    ) -> Option<ParsedDeal> {
        if !self.signals.matches(gate) {
            return None;
        }
        Some(self.build(title, description, source_url, today))
    }

    fn build(&self, title: &str, description: &str, source_url: &str, today: NaiveDate) -> ParsedDeal {
        let combined = format!("{} {}", title, description);
        let combined = combined.trim();

        let resolved = dates::resolve(&self.date_parsers, combined, today);

        ParsedDeal {
            title: truncate_chars(title.trim(), MAX_TITLE_CHARS),
            description: truncate_chars(description.trim(), MAX_DESCRIPTION_CHARS),
            deal_type: classify(combined),
            discount_percentage: extract_discount(combined),
            deal_code: extract_code(combined),
            valid_from: resolved.range.from,
            valid_to: resolved.range.to,
            travel_valid_from: resolved.range.from,
            travel_valid_to: resolved.range.to,
            dates_inferred: resolved.inferred,
            source_url: source_url.to_string(),
        }
    }
}

/// First `N% off|discount|savings` in the text
pub fn extract_discount(text: &str) -> Option<f64> {
    DISCOUNT_RE
        .captures(text)
        .and_then(|cap| cap[1].parse::<f64>().ok())
}

/// First `code: XYZ` in the text
pub fn extract_code(text: &str) -> Option<String> {
    CODE_RE.captures(text).map(|cap| cap[1].to_string())
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
