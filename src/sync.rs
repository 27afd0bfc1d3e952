use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::extract::ParsedDeal;
use crate::store::types::{HealthUpdate, IdentityStrategy, UpsertOutcome};
use crate::store::DealStore;

/// What one adapter run produced
#[derive(Debug, Clone, Copy)]
pub enum AdapterRun<'a> {
    Succeeded(&'a [ParsedDeal]),
    Failed(&'a str),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub source_known: bool,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub new_deal_ids: Vec<i64>,
}

/// Reconciles adapter output with the store, shared by every adapter
#[derive(Clone)]
pub struct RepositorySync {
    store: Arc<DealStore>,
}

impl RepositorySync {
    pub fn new(store: Arc<DealStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<DealStore> {
        &self.store
    }

    pub fn apply(&self, source_name: &str, identity: IdentityStrategy, run: AdapterRun<'_>) -> SyncReport {
        self.apply_at(source_name, identity, run, Utc::now())
    }

    /// Upsert candidates and record source health once.
    ///
    /// Assumes runs of the same source never overlap.
    pub fn apply_at(
        &self,
        source_name: &str,
        identity: IdentityStrategy,
        run: AdapterRun<'_>,
        now: DateTime<Utc>,
    ) -> SyncReport {
        let mut report = SyncReport::default();

        let source = match self.store.find_source(source_name) {
            Ok(Some(source)) => source,
            Ok(None) => {
                error!("[{}] Source not found in database", source_name);
                return report;
            }
            Err(e) => {
                error!("[{}] Failed to look up source: {:#}", source_name, e);
                return report;
            }
        };
        report.source_known = true;

        let health = match run {
            AdapterRun::Succeeded(deals) => {
                for deal in deals {
                    let key = identity.key(deal, source.id);
                    match self.store.upsert_deal(source.id, &key, deal, now) {
                        Ok(UpsertOutcome::Inserted(id)) => {
                            info!("[{}] Created new deal: {}", source_name, deal.title);
                            report.inserted += 1;
                            report.new_deal_ids.push(id);
                        }
                        Ok(UpsertOutcome::Updated(_)) => {
                            info!("[{}] Updated existing deal: {}", source_name, deal.title);
                            report.updated += 1;
                        }
                        Err(e) => {
                            error!("[{}] Error saving deal '{}': {:#}", source_name, deal.title, e);
                            report.skipped += 1;
                        }
                    }
                }
                HealthUpdate::Success
            }
            AdapterRun::Failed(message) => HealthUpdate::Failure(message.to_string()),
        };

        match self.store.update_source_health(source_name, &health, now) {
            Ok(true) => {}
            Ok(false) => warn!("[{}] Source disappeared before health update", source_name),
            Err(e) => error!("[{}] Error updating source status: {:#}", source_name, e),
        }

        report
    }
}
