use chrono::NaiveDate;

use super::stats::{self, mean};
use super::{DealPredictor, Evidence, HistoryReader, PredictionResult, PredictionType, TrendDirection};
use crate::store::types::SnapshotFilter;

const LOOKBACK_YEARS: u32 = 2;
const MIN_SNAPSHOTS: usize = 20;
const RECENT_WINDOW: usize = 10;
const OLDER_WINDOW: usize = 20;
const TREND_THRESHOLD_PCT: f64 = 5.0;
const TREND_CONFIDENCE: u8 = 75;

impl<R: HistoryReader> DealPredictor<R> {
    /// Compare recent nightly prices against the preceding window for check-ins up to `anchor`
    pub fn predict_price_trend(&self, resort_id: &str, anchor: NaiveDate) -> PredictionResult {
        let snapshots = self.snapshots(&SnapshotFilter {
            resort_id: resort_id.to_string(),
            from: stats::years_before(anchor, LOOKBACK_YEARS),
            to: anchor,
        });

        let insufficient = || {
            PredictionResult::degraded(
                PredictionType::PriceTrend,
                30,
                "Insufficient price history for accurate prediction",
            )
        };

        if snapshots.len() < MIN_SNAPSHOTS {
            return insufficient();
        }

        let prices: Vec<f64> = snapshots.iter().map(|s| s.price_per_night).collect();
        let split = prices.len() - RECENT_WINDOW;
        let recent_avg = mean(&prices[split..]);
        let older_avg = mean(&prices[split.saturating_sub(OLDER_WINDOW)..split]);

        if older_avg <= 0.0 {
            return insufficient();
        }

        let trend_pct = (recent_avg - older_avg) / older_avg * 100.0;
        let direction = if trend_pct < -TREND_THRESHOLD_PCT {
            TrendDirection::Decreasing
        } else if trend_pct > TREND_THRESHOLD_PCT {
            TrendDirection::Increasing
        } else {
            TrendDirection::Stable
        };
        let predicted = (recent_avg * (1.0 + trend_pct / 100.0)).round_ties_even();

        PredictionResult {
            prediction_type: PredictionType::PriceTrend,
            confidence: TREND_CONFIDENCE,
            predicted_date: None,
            predicted_discount: None,
            predicted_price: Some(predicted),
            reasoning: format!(
                "Prices are {} ({}{:.1}%). Recent average: ${}, predicted: ${}",
                direction,
                if trend_pct > 0.0 { "+" } else { "" },
                trend_pct,
                recent_avg.round(),
                predicted
            ),
            supporting_data: vec![Evidence::PriceTrend {
                trend: direction,
                trend_percentage: (trend_pct * 10.0).round() / 10.0,
                recent_average: recent_avg.round(),
                historical_average: older_avg.round(),
                sample_size: prices.len(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::test_support::{add_resort, store_with_source};
    use crate::store::types::PriceSnapshot;
    use crate::store::DealStore;
    use chrono::{Duration, TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Daily check-ins ending on `last`, oldest first
    fn seed_prices(store: &DealStore, resort: &str, last: NaiveDate, prices: &[f64]) {
        let recorded = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        for (i, &price) in prices.iter().enumerate() {
            let offset = (prices.len() - 1 - i) as i64;
            store
                .append_price_snapshot(
                    &PriceSnapshot {
                        resort_id: resort.to_string(),
                        check_in_date: last - Duration::days(offset),
                        price_per_night: price,
                    },
                    recorded,
                )
                .unwrap();
        }
    }

    fn store() -> DealStore {
        let (store, _) = store_with_source();
        add_resort(&store, "poly", "deluxe");
        store
    }

    #[test]
    fn test_decreasing_trend() {
        let store = store();
        let mut prices = vec![200.0; 20];
        prices.extend([150.0; 10]);
        seed_prices(&store, "poly", date(2026, 5, 31), &prices);

        let predictor = DealPredictor::with_today(&store, date(2026, 3, 1));
        let result = predictor.predict_price_trend("poly", date(2026, 6, 1));

        assert_eq!(result.confidence, 75);
        assert_eq!(result.predicted_price, Some(112.0));
        assert!(result.predicted_discount.is_none());
        assert_eq!(
            result.reasoning,
            "Prices are decreasing (-25.0%). Recent average: $150, predicted: $112"
        );
        assert_eq!(
            result.supporting_data,
            vec![Evidence::PriceTrend {
                trend: TrendDirection::Decreasing,
                trend_percentage: -25.0,
                recent_average: 150.0,
                historical_average: 200.0,
                sample_size: 30,
            }]
        );
    }

    #[test]
    fn test_small_moves_are_stable() {
        let store = store();
        let mut prices = vec![100.0; 15];
        prices.extend([104.0; 10]);
        seed_prices(&store, "poly", date(2026, 5, 31), &prices);

        let predictor = DealPredictor::with_today(&store, date(2026, 3, 1));
        let result = predictor.predict_price_trend("poly", date(2026, 6, 1));

        assert_eq!(result.confidence, 75);
        assert!(result.reasoning.starts_with("Prices are stable (+4.0%)"));
    }

    #[test]
    fn test_snapshots_after_anchor_are_ignored() {
        let store = store();
        seed_prices(&store, "poly", date(2026, 5, 31), &[180.0; 15]);
        seed_prices(&store, "poly", date(2026, 7, 31), &[250.0; 15]);

        let predictor = DealPredictor::with_today(&store, date(2026, 3, 1));
        let result = predictor.predict_price_trend("poly", date(2026, 6, 1));

        assert_eq!(result.confidence, 30);
        assert_eq!(result.reasoning, "Insufficient price history for accurate prediction");
        assert!(result.predicted_price.is_none());
    }

    #[test]
    fn test_zero_baseline_degrades() {
        let store = store();
        let mut prices = vec![0.0; 20];
        prices.extend([120.0; 10]);
        seed_prices(&store, "poly", date(2026, 5, 31), &prices);

        let predictor = DealPredictor::with_today(&store, date(2026, 3, 1));
        assert_eq!(predictor.predict_price_trend("poly", date(2026, 6, 1)).confidence, 30);
    }
}
