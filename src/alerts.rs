//! Email alerts through the shared notification service.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::predictor::PredictionResult;
use crate::store::types::HistoricalDeal;

pub const DEAL_ALERT: &str = "deal_alert";
pub const PRICE_PREDICTION_ALERT: &str = "price_prediction";

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("alert service returned status {0}")]
    Status(u16),

    #[error("alert rejected: {0}")]
    Rejected(String),

    #[error("failed to encode alert data: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl From<Vec<String>> for Recipients {
    fn from(mut list: Vec<String>) -> Self {
        if list.len() == 1 {
            Recipients::One(list.remove(0))
        } else {
            Recipients::Many(list)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    #[serde(rename = "type")]
    pub alert_type: &'static str,
    pub to: Recipients,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub app_id: String,
}

impl AlertPayload {
    pub fn deal_alert(to: Recipients, deal: &HistoricalDeal, user_id: Option<String>, app_id: &str) -> Self {
        Self {
            alert_type: DEAL_ALERT,
            to,
            data: json!({
                "dealType": deal.deal_type,
                "title": deal.title,
                "description": deal.description,
                "savingsPercent": deal.discount_percentage,
                "dealCode": deal.deal_code,
                "dealUrl": deal.source_url,
                "travelValidFrom": deal.travel_valid_from,
                "expiresAt": deal.valid_to,
            }),
            user_id,
            app_id: app_id.to_string(),
        }
    }

    pub fn prediction_alert(
        to: Recipients,
        prediction: &PredictionResult,
        user_id: Option<String>,
        app_id: &str,
    ) -> Result<Self, AlertError> {
        Ok(Self {
            alert_type: PRICE_PREDICTION_ALERT,
            to,
            data: serde_json::to_value(prediction)?,
            user_id,
            app_id: app_id.to_string(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertReceipt {
    #[serde(default)]
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

pub struct AlertClient {
    client: Client,
    central_api: String,
}

impl AlertClient {
    pub fn new(central_api: &str, timeout: Duration) -> Result<Self, AlertError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            central_api: central_api.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/email/alerts", self.central_api)
    }

    /// POST one alert. No retry.
    pub async fn send(&self, payload: &AlertPayload) -> Result<AlertReceipt, AlertError> {
        let response = self.client.post(self.endpoint()).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertError::Status(status.as_u16()));
        }

        let receipt: AlertReceipt = response.json().await?;
        if !receipt.success {
            return Err(AlertError::Rejected(
                receipt.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        tracing::debug!("Alert {} delivered: {:?}", payload.alert_type, receipt.message_id);
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::DealType;
    use crate::predictor::{PredictionType, TrendDirection, Evidence};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn deal() -> HistoricalDeal {
        let day = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let created = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
        HistoricalDeal {
            id: 7,
            source_id: 1,
            resort_id: None,
            title: "Save 25% on rooms this summer".to_string(),
            description: "Community-shared deal from DISboards".to_string(),
            deal_type: DealType::RoomDiscount,
            discount_percentage: Some(25.0),
            deal_code: Some("SUMMER25".to_string()),
            valid_from: day,
            valid_to: NaiveDate::from_ymd_opt(2026, 8, 31).unwrap(),
            travel_valid_from: day,
            travel_valid_to: NaiveDate::from_ymd_opt(2026, 8, 31).unwrap(),
            dates_inferred: false,
            source_url: "https://www.disboards.com/threads/1".to_string(),
            is_active: true,
            priority: 0,
            ticket_required: false,
            dining_plan_included: false,
            blackout_dates: vec![],
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_deal_alert_shape() {
        let payload = AlertPayload::deal_alert(
            Recipients::One("fan@example.com".to_string()),
            &deal(),
            None,
            "orlando-deals",
        );
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["type"], "deal_alert");
        assert_eq!(value["to"], "fan@example.com");
        assert_eq!(value["appId"], "orlando-deals");
        assert!(value.get("userId").is_none());
        assert_eq!(value["data"]["dealType"], "room_discount");
        assert_eq!(value["data"]["savingsPercent"], 25.0);
        assert_eq!(value["data"]["dealCode"], "SUMMER25");
        assert_eq!(value["data"]["expiresAt"], "2026-08-31");
    }

    #[test]
    fn test_prediction_alert_shape() {
        let prediction = PredictionResult {
            prediction_type: PredictionType::PriceTrend,
            confidence: 75,
            predicted_date: None,
            predicted_discount: None,
            predicted_price: Some(112.0),
            reasoning: "Prices are decreasing".to_string(),
            supporting_data: vec![Evidence::PriceTrend {
                trend: TrendDirection::Decreasing,
                trend_percentage: -25.0,
                recent_average: 150.0,
                historical_average: 200.0,
                sample_size: 30,
            }],
        };

        let payload = AlertPayload::prediction_alert(
            vec!["a@example.com".to_string(), "b@example.com".to_string()].into(),
            &prediction,
            Some("user-1".to_string()),
            "orlando-deals",
        )
        .unwrap();
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["type"], "price_prediction");
        assert_eq!(value["to"], json!(["a@example.com", "b@example.com"]));
        assert_eq!(value["userId"], "user-1");
        assert_eq!(value["data"]["prediction_type"], "price_trend");
        assert_eq!(value["data"]["predicted_price"], 112.0);
        assert_eq!(value["data"]["supporting_data"][0]["trend"], "decreasing");
        assert!(value["data"].get("predicted_date").is_none());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = AlertClient::new("https://central.example/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.endpoint(), "https://central.example/api/email/alerts");
    }
}
