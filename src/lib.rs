//! Travel-deal aggregation: scrape community and blog sources, reconcile them
//! into a SQLite repository, and estimate timing, discount and price trends
//! from the accumulated history.

pub mod aggregator;
pub mod alerts;
pub mod config;
pub mod extract;
pub mod monitoring;
pub mod predictor;
pub mod sources;
pub mod store;
pub mod sync;
