use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{error, info};

use crate::sources::SourceAdapter;
use crate::sync::{AdapterRun, RepositorySync, SyncReport};

/// Result of one adapter inside a run
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub name: String,
    pub success: bool,
    pub deals_found: usize,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub inserted: usize,
    pub updated: usize,
    pub new_deal_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<SourceOutcome>,
    pub total_deals_found: usize,
    pub successful_sources: usize,
    pub failed_sources: usize,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, outcomes: Vec<SourceOutcome>) -> Self {
        let total_deals_found = outcomes.iter().map(|o| o.deals_found).sum();
        let successful_sources = outcomes.iter().filter(|o| o.success).count();
        let failed_sources = outcomes.len() - successful_sources;

        Self {
            started_at,
            outcomes,
            total_deals_found,
            successful_sources,
            failed_sources,
        }
    }

    pub fn outcome(&self, name: &str) -> Option<&SourceOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn log_summary(&self) {
        info!("=== Aggregation Summary ===");
        info!("Total deals found: {}", self.total_deals_found);
        info!(
            "Successful sources: {}/{}",
            self.successful_sources,
            self.outcomes.len()
        );
        info!("Failed sources: {}", self.failed_sources);

        for outcome in &self.outcomes {
            let status = if outcome.success { "✓" } else { "✗" };
            info!(
                "{} {}: {} deals ({}ms, {} new, {} updated)",
                status, outcome.name, outcome.deals_found, outcome.duration_ms, outcome.inserted, outcome.updated
            );
            if let Some(err) = &outcome.error {
                error!("  Error: {}", err);
            }
        }
    }
}

/// Runs every configured adapter, isolating each one's failure
pub struct Aggregator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    sync: RepositorySync,
    max_concurrent: usize,
}

impl Aggregator {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, sync: RepositorySync, max_concurrent: usize) -> Self {
        Self {
            adapters,
            sync,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// One full aggregation pass. Never fails; partial failure is in the summary.
    pub async fn run(&self) -> RunSummary {
        let started_at = Utc::now();
        info!("=== Starting Deal Aggregation ===");
        info!("Timestamp: {}", started_at.to_rfc3339());

        let outcomes = stream::iter(self.adapters.iter().cloned())
            .map(|adapter| run_isolated(adapter, self.sync.clone()))
            .buffered(self.max_concurrent)
            .collect::<Vec<_>>()
            .await;

        let summary = RunSummary::new(started_at, outcomes);
        summary.log_summary();
        summary
    }
}

/// Fault-isolation boundary: errors and panics become a failed outcome
async fn run_isolated(adapter: Arc<dyn SourceAdapter>, sync: RepositorySync) -> SourceOutcome {
    let name = adapter.name().to_string();
    let identity = adapter.identity();
    let start = Instant::now();

    let fetch = tokio::spawn({
        let adapter = Arc::clone(&adapter);
        async move { adapter.collect().await }
    });

    let collected: Result<Vec<_>, String> = match fetch.await {
        Ok(Ok(deals)) => Ok(deals),
        Ok(Err(e)) => {
            error!("[{}] Error: {}", name, e);
            Err(e.to_string())
        }
        Err(e) => {
            let message = join_error_message(e);
            error!("[{}] Adapter aborted: {}", name, message);
            Err(message)
        }
    };

    let deals_found = collected.as_ref().map(Vec::len).unwrap_or(0);
    let error = collected.as_ref().err().cloned();

    let sync_name = name.clone();
    let report = tokio::task::spawn_blocking(move || {
        let run = match &collected {
            Ok(deals) => AdapterRun::Succeeded(deals),
            Err(message) => AdapterRun::Failed(message),
        };
        sync.apply(&sync_name, identity, run)
    })
    .await;

    let (report, error) = match report {
        Ok(report) if !report.source_known && error.is_none() => {
            (report, Some("source not registered; nothing persisted".to_string()))
        }
        Ok(report) => (report, error),
        Err(e) => {
            let message = format!("repository sync aborted: {}", join_error_message(e));
            error!("[{}] {}", name, message);
            (SyncReport::default(), Some(message))
        }
    };

    SourceOutcome {
        name,
        success: error.is_none(),
        deals_found,
        error,
        duration_ms: start.elapsed().as_millis() as u64,
        inserted: report.inserted,
        updated: report.updated,
        new_deal_ids: report.new_deal_ids,
    }
}

fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => format!("panicked: {}", panic_payload(payload.as_ref())),
        Err(_) => "task failed".to_string(),
    }
}

fn panic_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{DealType, ParsedDeal};
    use crate::sources::SourceError;
    use crate::store::types::IdentityStrategy;
    use crate::store::DealStore;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    enum Behavior {
        Deals(usize),
        Fail,
        Panic,
    }

    struct StubAdapter {
        name: &'static str,
        behavior: Behavior,
    }

    fn candidate(source: &str, index: usize) -> ParsedDeal {
        let day = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        ParsedDeal {
            title: format!("{} room discount #{}", source, index),
            description: "Community-shared deal".to_string(),
            deal_type: DealType::RoomDiscount,
            discount_percentage: Some(15.0),
            deal_code: None,
            valid_from: day,
            valid_to: day,
            travel_valid_from: day,
            travel_valid_to: day,
            dates_inferred: false,
            source_url: format!("https://{}.example/{}", source, index),
        }
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn name(&self) -> &str {
            self.name
        }

        fn identity(&self) -> IdentityStrategy {
            IdentityStrategy::Url
        }

        async fn collect(&self) -> Result<Vec<ParsedDeal>, SourceError> {
            match self.behavior {
                Behavior::Deals(n) => Ok((0..n).map(|i| candidate(self.name, i)).collect()),
                Behavior::Fail => Err(SourceError::Status {
                    url: "https://fail.example".to_string(),
                    status: 503,
                }),
                Behavior::Panic => panic!("selector blew up"),
            }
        }
    }

    fn aggregator(adapters: Vec<StubAdapter>) -> (Aggregator, Arc<DealStore>) {
        let store = Arc::new(DealStore::in_memory().unwrap());
        for adapter in &adapters {
            store.register_source(adapter.name, None).unwrap();
        }
        let adapters = adapters
            .into_iter()
            .map(|a| Arc::new(a) as Arc<dyn SourceAdapter>)
            .collect();
        (Aggregator::new(adapters, RepositorySync::new(Arc::clone(&store)), 2), store)
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let (aggregator, store) = aggregator(vec![
            StubAdapter { name: "alpha", behavior: Behavior::Deals(3) },
            StubAdapter { name: "broken", behavior: Behavior::Fail },
            StubAdapter { name: "crashy", behavior: Behavior::Panic },
            StubAdapter { name: "omega", behavior: Behavior::Deals(2) },
        ]);

        let summary = aggregator.run().await;

        let names: Vec<_> = summary.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "broken", "crashy", "omega"]);

        assert!(summary.outcome("alpha").unwrap().success);
        assert!(summary.outcome("omega").unwrap().success);
        assert_eq!(summary.outcome("omega").unwrap().inserted, 2);

        let broken = summary.outcome("broken").unwrap();
        assert!(!broken.success);
        assert!(broken.error.as_deref().unwrap().contains("503"));

        let crashy = summary.outcome("crashy").unwrap();
        assert!(!crashy.success);
        assert!(crashy.error.as_deref().unwrap().contains("selector blew up"));

        assert_eq!(summary.total_deals_found, 5);
        assert_eq!(summary.successful_sources, 2);
        assert_eq!(summary.failed_sources, 2);

        assert_eq!(store.count_deals().unwrap(), 5);
        assert_eq!(store.find_source("crashy").unwrap().unwrap().error_count, 1);
        assert_eq!(store.find_source("broken").unwrap().unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn test_unregistered_source_is_reported_as_failed() {
        let store = Arc::new(DealStore::in_memory().unwrap());
        let adapters = vec![Arc::new(StubAdapter { name: "stray", behavior: Behavior::Deals(2) }) as Arc<dyn SourceAdapter>];
        let aggregator = Aggregator::new(adapters, RepositorySync::new(Arc::clone(&store)), 1);

        let summary = aggregator.run().await;
        let stray = summary.outcome("stray").unwrap();

        assert!(!stray.success);
        assert_eq!(stray.deals_found, 2);
        assert_eq!(stray.inserted, 0);
        assert!(stray.error.as_deref().unwrap().contains("not registered"));
        assert_eq!(summary.failed_sources, 1);
        assert_eq!(store.count_deals().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zero_deals_is_still_success() {
        let (aggregator, _store) = aggregator(vec![StubAdapter { name: "quiet", behavior: Behavior::Deals(0) }]);

        let summary = aggregator.run().await;
        let quiet = summary.outcome("quiet").unwrap();

        assert!(quiet.success);
        assert_eq!(quiet.deals_found, 0);
        assert!(quiet.error.is_none());
    }

    #[tokio::test]
    async fn test_rerun_updates_instead_of_duplicating() {
        let (aggregator, store) = aggregator(vec![StubAdapter { name: "alpha", behavior: Behavior::Deals(2) }]);

        aggregator.run().await;
        let second = aggregator.run().await;

        assert_eq!(second.outcome("alpha").unwrap().inserted, 0);
        assert_eq!(second.outcome("alpha").unwrap().updated, 2);
        assert_eq!(store.count_deals().unwrap(), 2);
    }
}
