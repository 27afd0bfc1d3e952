use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::aggregator::{RunSummary, SourceOutcome};

const HEADER: &str = "timestamp,source,success,deals_found,inserted,updated,duration_ms,error";

/// Appends one CSV row per source outcome
pub struct RunLogger {
    log_path: PathBuf,
}

impl RunLogger {
    pub fn new(log_path: impl AsRef<Path>) -> Result<Self> {
        let log_path = log_path.as_ref().to_path_buf();

        // Create CSV file with headers if it doesn't exist
        if !log_path.exists() {
            if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)
                .with_context(|| format!("Failed to create run log: {}", log_path.display()))?;

            writeln!(file, "{}", HEADER)?;
        }

        Ok(Self { log_path })
    }

    pub fn log_summary(&self, summary: &RunSummary) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open run log: {}", self.log_path.display()))?;

        let timestamp = summary.started_at.to_rfc3339();
        for outcome in &summary.outcomes {
            writeln!(file, "{}", row(&timestamp, outcome))?;
        }

        Ok(())
    }
}

fn row(timestamp: &str, outcome: &SourceOutcome) -> String {
    format!(
        "{},{},{},{},{},{},{},{}",
        timestamp,
        escape(&outcome.name),
        outcome.success,
        outcome.deals_found,
        outcome.inserted,
        outcome.updated,
        outcome.duration_ms,
        outcome.error.as_deref().map(escape).unwrap_or_default()
    )
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
