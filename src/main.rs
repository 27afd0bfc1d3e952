use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use deal_radar::aggregator::{Aggregator, RunSummary};
use deal_radar::alerts::{AlertClient, AlertPayload, Recipients};
use deal_radar::config::{Config, EnvConfig};
use deal_radar::extract::DealType;
use deal_radar::monitoring::logger::RunLogger;
use deal_radar::predictor::{DealPredictor, PredictionResult};
use deal_radar::sources::{build_adapters, HttpFetcher};
use deal_radar::store::DealStore;
use deal_radar::sync::RepositorySync;

const USAGE: &str = "usage:
  deal-radar [run] [config.toml]
  deal-radar predict announcement <deal_type>
  deal-radar predict discount <resort_id> [travel_date]
  deal-radar predict booking-window <resort_type> [travel_date]
  deal-radar predict price-trend <resort_id> [anchor_date]

predict reads DEAL_RADAR_CONFIG (default config.toml); dates are YYYY-MM-DD";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Run { config_path: String },
    Predict(Estimate),
}

#[derive(Debug, Clone, PartialEq)]
enum Estimate {
    Announcement(DealType),
    Discount { resort_id: String, travel_date: Option<NaiveDate> },
    BookingWindow { resort_type: String, travel_date: Option<NaiveDate> },
    PriceTrend { resort_id: String, anchor: Option<NaiveDate> },
}

fn parse_command(args: &[String]) -> Result<Command> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        [] => Ok(Command::Run { config_path: "config.toml".to_string() }),
        ["run"] => Ok(Command::Run { config_path: "config.toml".to_string() }),
        ["run", path] => Ok(Command::Run { config_path: path.to_string() }),
        ["predict", kind, key, rest @ ..] if rest.len() <= 1 => {
            let date = rest.first().map(|d| parse_date(d)).transpose()?;
            let estimate = match *kind {
                "announcement" if date.is_none() => Estimate::Announcement(key.parse()?),
                "discount" => Estimate::Discount { resort_id: key.to_string(), travel_date: date },
                "booking-window" => Estimate::BookingWindow { resort_type: key.to_string(), travel_date: date },
                "price-trend" => Estimate::PriceTrend { resort_id: key.to_string(), anchor: date },
                _ => bail!("unknown estimate '{}'\n{}", kind, USAGE),
            };
            Ok(Command::Predict(estimate))
        }
        [path] if *path != "predict" => Ok(Command::Run { config_path: path.to_string() }),
        _ => bail!("{}", USAGE),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("Invalid date '{}' (expected YYYY-MM-DD)", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_command(&args)?;

    tracing::info!("Deal radar starting...");

    let config_path = match &command {
        Command::Run { config_path } => config_path.clone(),
        Command::Predict(_) => std::env::var("DEAL_RADAR_CONFIG").unwrap_or_else(|_| "config.toml".to_string()),
    };
    tracing::info!("Loading configuration: {}", config_path);
    let mut config = Config::load(&config_path)?;
    let env_config = EnvConfig::load()?;
    config.apply_env(&env_config);

    tracing::info!("Initializing database: {}", config.system.database_path);
    let store = Arc::new(DealStore::new(&config.system.database_path)?);

    match command {
        Command::Run { .. } => run_aggregation(&config, store).await,
        Command::Predict(estimate) => run_prediction(&config, &store, estimate).await,
    }
}

async fn run_aggregation(config: &Config, store: Arc<DealStore>) -> Result<()> {
    for source in &config.sources {
        store
            .register_source(&source.name, source.base_url.as_deref())
            .with_context(|| format!("Failed to register source {}", source.name))?;
    }

    let fetcher = HttpFetcher::new(
        &config.aggregation.user_agent,
        Duration::from_secs(config.aggregation.request_timeout_secs),
    )?;
    let adapters = build_adapters(&config.sources, &fetcher)?;
    tracing::info!("{} of {} sources enabled", adapters.len(), config.sources.len());

    let aggregator = Aggregator::new(
        adapters,
        RepositorySync::new(Arc::clone(&store)),
        config.aggregation.max_concurrent_sources,
    );
    let summary = aggregator.run().await;

    if config.monitoring.csv_logging {
        if let Err(e) = RunLogger::new(&config.monitoring.csv_log_path).and_then(|log| log.log_summary(&summary)) {
            tracing::error!("Failed to write run log: {:#}", e);
        }
    }

    if config.alerts.enabled {
        send_deal_alerts(config, &store, &summary).await;
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_prediction(config: &Config, store: &DealStore, estimate: Estimate) -> Result<()> {
    let predictor = DealPredictor::new(store);
    let today = predictor.today();

    let result = match estimate {
        Estimate::Announcement(deal_type) => predictor.predict_announcement(deal_type),
        Estimate::Discount { resort_id, travel_date } => {
            predictor.predict_discount(&resort_id, travel_date.unwrap_or(today))
        }
        Estimate::BookingWindow { resort_type, travel_date } => {
            predictor.predict_booking_window(&resort_type, travel_date.unwrap_or(today))
        }
        Estimate::PriceTrend { resort_id, anchor } => {
            predictor.predict_price_trend(&resort_id, anchor.unwrap_or(today))
        }
    };

    tracing::info!("{:?} prediction: confidence {}%", result.prediction_type, result.confidence);

    if config.alerts.enabled && result.confidence > 0 {
        send_prediction_alert(config, &result).await;
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Alert client when alerts are fully configured
fn alert_client(config: &Config) -> Option<AlertClient> {
    let Some(central_api) = config.alerts.central_api_url.as_deref() else {
        tracing::warn!("Alerts enabled but no central API URL configured");
        return None;
    };
    if config.alerts.recipients.is_empty() {
        tracing::warn!("Alerts enabled but no recipients configured");
        return None;
    }

    match AlertClient::new(central_api, Duration::from_secs(config.aggregation.request_timeout_secs)) {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::error!("Failed to build alert client: {}", e);
            None
        }
    }
}

async fn send_prediction_alert(config: &Config, result: &PredictionResult) {
    let Some(client) = alert_client(config) else {
        return;
    };

    let payload = match AlertPayload::prediction_alert(
        Recipients::from(config.alerts.recipients.clone()),
        result,
        None,
        &config.alerts.app_id,
    ) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!("Failed to build prediction alert: {}", e);
            return;
        }
    };

    if let Err(e) = client.send(&payload).await {
        tracing::error!("Prediction alert failed: {}", e);
    }
}

/// One alert per newly inserted deal. Failures are logged, never fatal.
async fn send_deal_alerts(config: &Config, store: &DealStore, summary: &RunSummary) {
    let Some(client) = alert_client(config) else {
        return;
    };

    let new_ids = summary.outcomes.iter().flat_map(|o| o.new_deal_ids.iter().copied());
    let mut sent = 0;
    for id in new_ids {
        let deal = match store.get_deal(id) {
            Ok(Some(deal)) => deal,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!("Failed to load deal {}: {:#}", id, e);
                continue;
            }
        };

        let payload = AlertPayload::deal_alert(
            Recipients::from(config.alerts.recipients.clone()),
            &deal,
            None,
            &config.alerts.app_id,
        );
        match client.send(&payload).await {
            Ok(_) => sent += 1,
            Err(e) => tracing::error!("Alert for '{}' failed: {}", deal.title, e),
        }
    }

    tracing::info!("Sent {} deal alerts", sent);
}
