use chrono::{Datelike, Months, NaiveDate};

use super::stats::{self, confidence, mean, month_name, std_dev};
use super::{DealPredictor, Evidence, HistoryReader, PredictionResult, PredictionType};
use crate::extract::DealType;
use crate::store::types::DealFilter;

const LOOKBACK_YEARS: u32 = 5;
const MIN_RECORDS: usize = 3;
const DEFAULT_DAY: u32 = 15;

impl<R: HistoryReader> DealPredictor<R> {
    /// Estimate when the next deal of `deal_type` will be announced
    pub fn predict_announcement(&self, deal_type: DealType) -> PredictionResult {
        let since = stats::start_of_day(stats::years_before(self.today, LOOKBACK_YEARS));
        let deals = self.deals(&DealFilter {
            deal_type: Some(deal_type),
            created_since: Some(since),
            ..Default::default()
        });

        if deals.len() < MIN_RECORDS {
            return PredictionResult::degraded(PredictionType::Announcement, 0, "Insufficient historical data");
        }

        let announced: Vec<NaiveDate> = deals.iter().map(|d| d.created_at.date_naive()).collect();
        let months: Vec<f64> = announced.iter().map(|d| d.month() as f64).collect();

        let avg_month = (mean(&months).round() as u32).clamp(1, 12);
        let days_in_month: Vec<f64> = announced
            .iter()
            .filter(|d| d.month() == avg_month)
            .map(|d| d.day() as f64)
            .collect();
        let avg_day = if days_in_month.is_empty() {
            DEFAULT_DAY
        } else {
            mean(&days_in_month).round() as u32
        };

        let score = confidence(100.0 - std_dev(&months) * 20.0);
        let predicted = next_occurrence(self.today, avg_month, avg_day);

        PredictionResult {
            prediction_type: PredictionType::Announcement,
            confidence: score,
            predicted_date: predicted,
            predicted_discount: None,
            predicted_price: None,
            reasoning: format!(
                "Based on {} historical announcements, {} deals are typically announced in {} (average day {}). Pattern consistency: {}%",
                deals.len(),
                deal_type,
                month_name(avg_month),
                avg_day,
                score
            ),
            supporting_data: announced
                .iter()
                .map(|&d| Evidence::Announcement {
                    year: d.year(),
                    announced: d,
                })
                .collect(),
        }
    }
}

/// `month`/`day` in the current year, or next year if already past
fn next_occurrence(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let date = clamped_date(today.year(), month, day)?;
    if date < today {
        clamped_date(today.year() + 1, month, day)
    } else {
        Some(date)
    }
}

fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())?
        .day();
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last))
}
