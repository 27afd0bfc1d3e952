use chrono::{Datelike, Duration, NaiveDate};
use regex::{Captures, Regex};

/// Validity window used when no date pattern matches
pub const DEFAULT_VALIDITY_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateMatch {
    Matched(DateRange),
    Unmatched,
}

/// Outcome of running the whole parser chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDates {
    pub range: DateRange,
    /// True when no parser matched and the default window was used
    pub inferred: bool,
}

/// One independent date-range recognizer
pub trait DateRangeParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inspect the first structural match only. Anything unparseable is `Unmatched`.
    fn parse(&self, text: &str, today: NaiveDate) -> DateMatch;
}

/// `6/1 - 8/31`, `06/01/25 - 08/31/2025`
pub struct NumericRange {
    regex: Regex,
}

impl NumericRange {
    pub fn new() -> Self {
        Self {
            regex: Regex::new(
                r"(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\s*-\s*(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?",
            )
            .expect("numeric date pattern is valid"),
        }
    }
}

impl Default for NumericRange {
    fn default() -> Self {
        Self::new()
    }
}

impl DateRangeParser for NumericRange {
    fn name(&self) -> &'static str {
        "numeric"
    }

    fn parse(&self, text: &str, today: NaiveDate) -> DateMatch {
        let Some(cap) = self.regex.captures(text) else {
            return DateMatch::Unmatched;
        };

        let end = |month: usize, day: usize, year: usize| -> Option<(u32, u32, Option<i32>)> {
            let month = cap.get(month)?.as_str().parse().ok()?;
            let day = cap.get(day)?.as_str().parse().ok()?;
            let year = match cap.get(year) {
                Some(y) => Some(parse_year(y.as_str())?),
                None => None,
            };
            Some((month, day, year))
        };

        match (end(1, 2, 3), end(4, 5, 6)) {
            (Some(from), Some(to)) => build_range(from, to, today),
            _ => DateMatch::Unmatched,
        }
    }
}

/// `June 1 - August 31`, `Jan 5, 2026 through Feb 20, 2026`
pub struct MonthNameRange {
    name: &'static str,
    regex: Regex,
}

const MONTH_PAIR: &str = r"([A-Za-z]+)\.?\s+(\d{1,2})(?:,\s*(\d{4}))?\s*(?:-|through|to|until)\s*([A-Za-z]+)\.?\s+(\d{1,2})(?:,\s*(\d{4}))?";

impl MonthNameRange {
    pub fn new() -> Self {
        Self {
            name: "month_name",
            regex: Regex::new(&format!("(?i){}", MONTH_PAIR)).expect("month pattern is valid"),
        }
    }

    /// Same shape, anchored on a leading "valid"
    pub fn valid_prefixed() -> Self {
        Self {
            name: "valid_prefixed",
            regex: Regex::new(&format!(r"(?i)valid\s+{}", MONTH_PAIR))
                .expect("valid-prefixed pattern is valid"),
        }
    }

    fn end(cap: &Captures<'_>, month: usize, day: usize, year: usize) -> Option<(u32, u32, Option<i32>)> {
        let month = month_from_name(cap.get(month)?.as_str())?;
        let day = cap.get(day)?.as_str().parse().ok()?;
        let year = match cap.get(year) {
            Some(y) => Some(y.as_str().parse().ok()?),
            None => None,
        };
        Some((month, day, year))
    }
}

impl Default for MonthNameRange {
    fn default() -> Self {
        Self::new()
    }
}

impl DateRangeParser for MonthNameRange {
    fn name(&self) -> &'static str {
        self.name
    }

    fn parse(&self, text: &str, today: NaiveDate) -> DateMatch {
        let Some(cap) = self.regex.captures(text) else {
            return DateMatch::Unmatched;
        };

        match (Self::end(&cap, 1, 2, 3), Self::end(&cap, 4, 5, 6)) {
            (Some(from), Some(to)) => build_range(from, to, today),
            _ => DateMatch::Unmatched,
        }
    }
}

/// Numeric ranges are tried before month-name ranges
pub fn default_parsers() -> Vec<Box<dyn DateRangeParser>> {
    vec![
        Box::new(NumericRange::new()),
        Box::new(MonthNameRange::new()),
        Box::new(MonthNameRange::valid_prefixed()),
    ]
}

/// Run parsers in order, stopping at the first match
pub fn resolve(parsers: &[Box<dyn DateRangeParser>], text: &str, today: NaiveDate) -> ResolvedDates {
    for parser in parsers {
        if let DateMatch::Matched(range) = parser.parse(text, today) {
            tracing::debug!("Date range matched by {} parser: {} to {}", parser.name(), range.from, range.to);
            return ResolvedDates { range, inferred: false };
        }
    }

    ResolvedDates {
        range: DateRange {
            from: today,
            to: today + Duration::days(DEFAULT_VALIDITY_DAYS),
        },
        inferred: true,
    }
}

fn build_range(
    from: (u32, u32, Option<i32>),
    to: (u32, u32, Option<i32>),
    today: NaiveDate,
) -> DateMatch {
    let (from_month, from_day, from_year) = from;
    let (to_month, to_day, to_year) = to;

    let start_year = match (from_year, to_year) {
        (Some(year), _) => year,
        // "December 20 through January 5, 2027" starts the year before
        (None, Some(year)) if (from_month, from_day) > (to_month, to_day) => year - 1,
        (None, Some(year)) => year,
        (None, None) => today.year(),
    };
    let Some(start) = NaiveDate::from_ymd_opt(start_year, from_month, from_day) else {
        return DateMatch::Unmatched;
    };

    let end_year = to_year.unwrap_or(start_year);
    let Some(mut end) = NaiveDate::from_ymd_opt(end_year, to_month, to_day) else {
        return DateMatch::Unmatched;
    };

    // "Dec 15 - Jan 5" spans the new year
    if end < start && to_year.is_none() {
        match NaiveDate::from_ymd_opt(end_year + 1, to_month, to_day) {
            Some(rolled) => end = rolled,
            None => return DateMatch::Unmatched,
        }
    }

    if end < start {
        return DateMatch::Unmatched;
    }

    DateMatch::Matched(DateRange { from: start, to: end })
}

fn parse_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    match raw.len() {
        2 => Some(2000 + year),
        4 => Some(year),
        _ => None,
    }
}

fn month_from_name(raw: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january", "february", "march", "april", "may", "june",
        "july", "august", "september", "october", "november", "december",
    ];

    let word = raw.to_lowercase();
    if word.len() < 3 {
        return None;
    }

    MONTHS
        .iter()
        .position(|full| *full == word || (full.starts_with(&word) && (word.len() == 3 || word == "sept")))
        .map(|index| index as u32 + 1)
}
