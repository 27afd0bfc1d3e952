use chrono::{Datelike, NaiveDate};

use super::stats::{self, confidence, mean, std_dev, Season};
use super::{DealPredictor, Evidence, HistoryReader, PredictionResult, PredictionType};
use crate::store::types::DealFilter;

const LOOKBACK_YEARS: u32 = 3;
const MIN_RECORDS: usize = 5;
const ALL_SEASON_CONFIDENCE: u8 = 20;

impl<R: HistoryReader> DealPredictor<R> {
    /// Estimate the discount a resort is likely to offer for travel on `travel_date`
    pub fn predict_discount(&self, resort_id: &str, travel_date: NaiveDate) -> PredictionResult {
        let since = stats::start_of_day(stats::years_before(self.today, LOOKBACK_YEARS));
        let deals = self.deals(&DealFilter {
            resort_id: Some(resort_id.to_string()),
            created_since: Some(since),
            discounted_only: true,
            ..Default::default()
        });

        if deals.len() < MIN_RECORDS {
            return PredictionResult::degraded(PredictionType::Discount, 0, "Insufficient historical discount data");
        }

        let season = Season::from_month(travel_date.month());
        let seasonal: Vec<_> = deals
            .iter()
            .filter(|d| Season::from_month(d.travel_valid_from.month()) == season)
            .collect();

        if seasonal.is_empty() {
            let all: Vec<f64> = deals.iter().filter_map(|d| d.discount_percentage).collect();
            return PredictionResult {
                predicted_discount: Some(mean(&all).round()),
                ..PredictionResult::degraded(
                    PredictionType::Discount,
                    ALL_SEASON_CONFIDENCE,
                    "Using average discount across all seasons (limited seasonal data)",
                )
            };
        }

        let discounts: Vec<f64> = seasonal.iter().filter_map(|d| d.discount_percentage).collect();
        let avg = mean(&discounts);
        let min = discounts.iter().copied().fold(f64::INFINITY, f64::min);
        let max = discounts.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let sample_score = (seasonal.len() as f64 * 10.0).min(100.0);
        let spread_score = (100.0 - std_dev(&discounts) * 10.0).max(0.0);

        PredictionResult {
            prediction_type: PredictionType::Discount,
            confidence: confidence((sample_score + spread_score) / 2.0),
            predicted_date: None,
            predicted_discount: Some(avg.round()),
            predicted_price: None,
            reasoning: format!(
                "Based on {} {} deals over the past 3 years. Typical range: {}%-{}%. Average: {}%",
                seasonal.len(),
                season,
                min.round(),
                max.round(),
                avg.round()
            ),
            supporting_data: seasonal
                .iter()
                .filter_map(|d| {
                    d.discount_percentage.map(|discount| Evidence::Discount {
                        year: d.created_at.year(),
                        discount,
                        deal: d.title.clone(),
                    })
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::DealType;
    use crate::predictor::test_support::{add_resort, seed_deal, store_with_source, Seed};
    use crate::store::DealStore;
    use chrono::{TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed(store: &DealStore, source_id: i64, title: &str, discount: Option<f64>, travel_from: NaiveDate, resort: &str) {
        seed_deal(
            store,
            source_id,
            Seed {
                title,
                deal_type: DealType::RoomDiscount,
                discount,
                travel_from,
                created_at: Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap(),
                resort_id: Some(resort),
            },
        );
    }

    fn seeded_store() -> DealStore {
        let (store, source_id) = store_with_source();
        add_resort(&store, "poly", "deluxe");
        add_resort(&store, "pop", "value");

        seed(&store, source_id, "Summer room rate A", Some(20.0), date(2025, 6, 10), "poly");
        seed(&store, source_id, "Summer room rate B", Some(25.0), date(2025, 7, 4), "poly");
        seed(&store, source_id, "Summer room rate C", Some(30.0), date(2025, 8, 20), "poly");
        seed(&store, source_id, "Winter room rate A", Some(10.0), date(2025, 12, 5), "poly");
        seed(&store, source_id, "Winter room rate B", Some(15.0), date(2026, 1, 12), "poly");
        // Ignored: no discount, other resort
        seed(&store, source_id, "Room upgrade offer", None, date(2025, 7, 1), "poly");
        seed(&store, source_id, "Value room rate", Some(40.0), date(2025, 7, 1), "pop");
        store
    }

    #[test]
    fn test_seasonal_prediction() {
        let store = seeded_store();
        let predictor = DealPredictor::with_today(&store, date(2026, 3, 1));

        let result = predictor.predict_discount("poly", date(2026, 7, 15));

        assert_eq!(result.prediction_type, PredictionType::Discount);
        assert_eq!(result.predicted_discount, Some(25.0));
        assert_eq!(result.confidence, 45);
        assert_eq!(result.supporting_data.len(), 3);
        assert!(result.reasoning.starts_with("Based on 3 summer deals"));
        assert!(result.reasoning.contains("20%-30%"));
    }

    #[test]
    fn test_empty_season_uses_all_season_average() {
        let store = seeded_store();
        let predictor = DealPredictor::with_today(&store, date(2026, 3, 1));

        let result = predictor.predict_discount("poly", date(2026, 10, 1));

        assert_eq!(result.confidence, 20);
        assert_eq!(result.predicted_discount, Some(20.0));
    }

    #[test]
    fn test_insufficient_discount_history() {
        let store = seeded_store();
        let predictor = DealPredictor::with_today(&store, date(2026, 3, 1));

        let result = predictor.predict_discount("pop", date(2026, 7, 15));

        assert_eq!(result.confidence, 0);
        assert_eq!(result.reasoning, "Insufficient historical discount data");
        assert!(result.predicted_discount.is_none());
    }
}
