use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::{DealType, ParsedDeal};

/// How a source's deals are matched against stored ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStrategy {
    /// The deal's own URL
    Url,
    /// Title within the source, for pages that list many deals under one URL
    TitleAndSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityKey<'a> {
    Url(&'a str),
    TitleAndSource { title: &'a str, source_id: i64 },
}

impl IdentityStrategy {
    /// URL identity falls back to title+source when the deal has no URL
    pub fn key<'a>(&self, deal: &'a ParsedDeal, source_id: i64) -> IdentityKey<'a> {
        match self {
            IdentityStrategy::Url if !deal.source_url.is_empty() => IdentityKey::Url(&deal.source_url),
            _ => IdentityKey::TitleAndSource {
                title: &deal.title,
                source_id,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub base_url: Option<String>,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthUpdate {
    Success,
    Failure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
}

/// A persisted deal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalDeal {
    pub id: i64,
    pub source_id: i64,
    pub resort_id: Option<String>,
    pub title: String,
    pub description: String,
    pub deal_type: DealType,
    pub discount_percentage: Option<f64>,
    pub deal_code: Option<String>,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub travel_valid_from: NaiveDate,
    pub travel_valid_to: NaiveDate,
    pub dates_inferred: bool,
    pub source_url: String,
    pub is_active: bool,
    pub priority: i64,
    pub ticket_required: bool,
    pub dining_plan_included: bool,
    pub blackout_dates: Vec<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resort {
    pub id: String,
    pub name: String,
    pub resort_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub resort_id: String,
    pub check_in_date: NaiveDate,
    pub price_per_night: f64,
}

/// A user action on a deal, joined with the deal's travel date and resort type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingRecord {
    pub deal_id: i64,
    pub user_action: String,
    pub action_timestamp: DateTime<Utc>,
    pub travel_valid_from: NaiveDate,
    pub resort_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DealFilter {
    pub deal_type: Option<DealType>,
    pub resort_id: Option<String>,
    pub created_since: Option<DateTime<Utc>>,
    pub discounted_only: bool,
}

#[derive(Debug, Clone)]
pub struct SnapshotFilter {
    pub resort_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingFilter {
    pub user_action: Option<String>,
}
