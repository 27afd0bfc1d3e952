use chrono::{Duration, NaiveDate};

use super::stats::{mean, std_dev};
use super::{DealPredictor, Evidence, HistoryReader, PredictionResult, PredictionType};
use crate::store::types::TrainingFilter;

const BOOKED_ACTION: &str = "booked";
const MIN_BOOKINGS: usize = 10;
const MAX_WINDOW_DAYS: i64 = 365;
const FALLBACK_CONFIDENCE: u8 = 50;
const INDUSTRY_RECOMMENDATION: &str = "Book 90-120 days in advance for best selection and pricing";

impl<R: HistoryReader> DealPredictor<R> {
    /// Estimate how far ahead of `travel_date` to book a `resort_type` resort
    pub fn predict_booking_window(&self, resort_type: &str, travel_date: NaiveDate) -> PredictionResult {
        let bookings = self.training(&TrainingFilter {
            user_action: Some(BOOKED_ACTION.to_string()),
        });

        if bookings.len() < MIN_BOOKINGS {
            return PredictionResult {
                supporting_data: vec![Evidence::Recommendation {
                    recommendation: INDUSTRY_RECOMMENDATION.to_string(),
                }],
                ..PredictionResult::degraded(
                    PredictionType::BookingWindow,
                    FALLBACK_CONFIDENCE,
                    "Using industry standard recommendation (insufficient personal data)",
                )
            };
        }

        let windows: Vec<i64> = bookings
            .iter()
            .filter(|b| b.resort_type.as_deref() == Some(resort_type))
            .map(|b| (b.travel_valid_from - b.action_timestamp.date_naive()).num_days())
            .filter(|&days| days > 0 && days < MAX_WINDOW_DAYS)
            .collect();

        let (Some(&earliest), Some(&latest)) = (windows.iter().min(), windows.iter().max()) else {
            return PredictionResult::degraded(
                PredictionType::BookingWindow,
                FALLBACK_CONFIDENCE,
                "No historical bookings for this resort type",
            );
        };

        let as_f64: Vec<f64> = windows.iter().map(|&w| w as f64).collect();
        let avg_window = mean(&as_f64).round() as i64;
        let score = (100.0 - std_dev(&as_f64) / 10.0).clamp(40.0, 95.0).round() as u8;

        PredictionResult {
            prediction_type: PredictionType::BookingWindow,
            confidence: score,
            predicted_date: travel_date.checked_sub_signed(Duration::days(avg_window)),
            predicted_discount: None,
            predicted_price: None,
            reasoning: format!(
                "Based on your {} past bookings for {} resorts, you typically book {} days in advance. This gives you the best balance of selection and pricing.",
                windows.len(),
                resort_type,
                avg_window
            ),
            supporting_data: vec![Evidence::BookingWindow {
                average_window: avg_window,
                earliest,
                latest,
                sample_size: windows.len(),
            }],
        }
    }
}
