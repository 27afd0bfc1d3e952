//! Historical-statistics estimators over stored deals and prices.
//!
//! Every estimator returns a [`PredictionResult`]. Thin history is not an error:
//! it yields a low- or zero-confidence result, so callers branch on `confidence`.

pub mod announcement;
pub mod booking_window;
pub mod discount;
pub mod price_trend;
pub mod stats;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

use crate::store::types::{
    DealFilter, HistoricalDeal, PriceSnapshot, SnapshotFilter, TrainingFilter, TrainingRecord,
};

/// Read-only view of the repository used by the estimators
pub trait HistoryReader: Send + Sync {
    fn query_deals(&self, filter: &DealFilter) -> Result<Vec<HistoricalDeal>>;
    fn query_price_snapshots(&self, filter: &SnapshotFilter) -> Result<Vec<PriceSnapshot>>;
    fn query_training_data(&self, filter: &TrainingFilter) -> Result<Vec<TrainingRecord>>;
}

impl<T: HistoryReader + ?Sized> HistoryReader for &T {
    fn query_deals(&self, filter: &DealFilter) -> Result<Vec<HistoricalDeal>> {
        (**self).query_deals(filter)
    }

    fn query_price_snapshots(&self, filter: &SnapshotFilter) -> Result<Vec<PriceSnapshot>> {
        (**self).query_price_snapshots(filter)
    }

    fn query_training_data(&self, filter: &TrainingFilter) -> Result<Vec<TrainingRecord>> {
        (**self).query_training_data(filter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionType {
    Announcement,
    Discount,
    BookingWindow,
    PriceTrend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
        };
        f.write_str(name)
    }
}

/// Raw records behind a prediction, enough to audit its reasoning
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Evidence {
    Announcement {
        year: i32,
        announced: NaiveDate,
    },
    Discount {
        year: i32,
        discount: f64,
        deal: String,
    },
    BookingWindow {
        average_window: i64,
        earliest: i64,
        latest: i64,
        sample_size: usize,
    },
    Recommendation {
        recommendation: String,
    },
    PriceTrend {
        trend: TrendDirection,
        trend_percentage: f64,
        recent_average: f64,
        historical_average: f64,
        sample_size: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub prediction_type: PredictionType,
    /// 0-100, derived from sample size and variance
    pub confidence: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_discount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_price: Option<f64>,
    pub reasoning: String,
    pub supporting_data: Vec<Evidence>,
}

impl PredictionResult {
    fn degraded(prediction_type: PredictionType, confidence: u8, reasoning: &str) -> Self {
        Self {
            prediction_type,
            confidence,
            predicted_date: None,
            predicted_discount: None,
            predicted_price: None,
            reasoning: reasoning.to_string(),
            supporting_data: Vec::new(),
        }
    }
}

/// Runs the estimators against one history reader
pub struct DealPredictor<R> {
    reader: R,
    today: NaiveDate,
}

impl<R: HistoryReader> DealPredictor<R> {
    pub fn new(reader: R) -> Self {
        Self::with_today(reader, Utc::now().date_naive())
    }

    /// Pin "today" so windows and roll-over are reproducible
    pub fn with_today(reader: R, today: NaiveDate) -> Self {
        Self { reader, today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    fn deals(&self, filter: &DealFilter) -> Vec<HistoricalDeal> {
        self.reader.query_deals(filter).unwrap_or_else(|e| {
            tracing::warn!("Failed to query historical deals: {:#}", e);
            Vec::new()
        })
    }

    fn snapshots(&self, filter: &SnapshotFilter) -> Vec<PriceSnapshot> {
        self.reader.query_price_snapshots(filter).unwrap_or_else(|e| {
            tracing::warn!("Failed to query price snapshots for {}: {:#}", filter.resort_id, e);
            Vec::new()
        })
    }

    fn training(&self, filter: &TrainingFilter) -> Vec<TrainingRecord> {
        self.reader.query_training_data(filter).unwrap_or_else(|e| {
            tracing::warn!("Failed to query training data: {:#}", e);
            Vec::new()
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, NaiveDate, Utc};

    use crate::extract::{DealType, ParsedDeal};
    use crate::store::types::{IdentityStrategy, Resort, UpsertOutcome};
    use crate::store::DealStore;

    pub fn store_with_source() -> (DealStore, i64) {
        let store = DealStore::in_memory().unwrap();
        let source_id = store.register_source("history", None).unwrap();
        (store, source_id)
    }

    pub fn add_resort(store: &DealStore, id: &str, resort_type: &str) {
        store
            .insert_resort(&Resort {
                id: id.to_string(),
                name: id.to_string(),
                resort_type: resort_type.to_string(),
            })
            .unwrap();
    }

    pub struct Seed<'a> {
        pub title: &'a str,
        pub deal_type: DealType,
        pub discount: Option<f64>,
        pub travel_from: NaiveDate,
        pub created_at: DateTime<Utc>,
        pub resort_id: Option<&'a str>,
    }

    pub fn seed_deal(store: &DealStore, source_id: i64, seed: Seed<'_>) -> i64 {
        let deal = ParsedDeal {
            title: seed.title.to_string(),
            description: String::new(),
            deal_type: seed.deal_type,
            discount_percentage: seed.discount,
            deal_code: None,
            valid_from: seed.travel_from,
            valid_to: seed.travel_from,
            travel_valid_from: seed.travel_from,
            travel_valid_to: seed.travel_from,
            dates_inferred: false,
            source_url: String::new(),
        };
        let key = IdentityStrategy::TitleAndSource.key(&deal, source_id);
        let UpsertOutcome::Inserted(id) = store.upsert_deal(source_id, &key, &deal, seed.created_at).unwrap()
        else {
            panic!("seed titles must be unique: {}", seed.title);
        };
        if let Some(resort_id) = seed.resort_id {
            store.assign_resort(id, resort_id).unwrap();
        }
        id
    }
}
