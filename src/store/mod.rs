pub mod types;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Mutex, MutexGuard};

use crate::extract::{DealType, ParsedDeal};
use crate::predictor::HistoryReader;
use types::{
    DealFilter, HealthUpdate, HistoricalDeal, IdentityKey, PriceSnapshot, Resort, SnapshotFilter,
    Source, TrainingFilter, TrainingRecord, UpsertOutcome,
};

const DEAL_COLUMNS: &str = "id, source_id, resort_id, title, description, deal_type, discount_percentage, deal_code,
     valid_from, valid_to, travel_valid_from, travel_valid_to, dates_inferred, source_url,
     is_active, priority, ticket_required, dining_plan_included, blackout_dates, created_at, updated_at";

/// SQLite-backed deal repository
pub struct DealStore {
    conn: Mutex<Connection>,
}

impl DealStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS deal_sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                base_url TEXT,
                error_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                last_checked_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL
            );

            CREATE TABLE IF NOT EXISTS resorts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                resort_type TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS deals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL,
                resort_id TEXT,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                deal_type TEXT NOT NULL,
                discount_percentage REAL,
                deal_code TEXT,
                valid_from TEXT NOT NULL,
                valid_to TEXT NOT NULL,
                travel_valid_from TEXT NOT NULL,
                travel_valid_to TEXT NOT NULL,
                dates_inferred INTEGER NOT NULL DEFAULT 0,
                source_url TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                priority INTEGER NOT NULL DEFAULT 0,
                ticket_required INTEGER NOT NULL DEFAULT 0,
                dining_plan_included INTEGER NOT NULL DEFAULT 0,
                blackout_dates TEXT NOT NULL DEFAULT '[]',
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY(source_id) REFERENCES deal_sources(id),
                FOREIGN KEY(resort_id) REFERENCES resorts(id)
            );

            CREATE TABLE IF NOT EXISTS price_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                resort_id TEXT NOT NULL,
                check_in_date TEXT NOT NULL,
                price_per_night REAL NOT NULL,
                recorded_at TIMESTAMP NOT NULL
            );

            CREATE TABLE IF NOT EXISTS training_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                deal_id INTEGER NOT NULL,
                user_action TEXT NOT NULL,
                action_timestamp TIMESTAMP NOT NULL,
                FOREIGN KEY(deal_id) REFERENCES deals(id)
            );

            CREATE INDEX IF NOT EXISTS idx_deals_source_url ON deals(source_id, source_url);
            CREATE INDEX IF NOT EXISTS idx_deals_source_title ON deals(source_id, title);
            CREATE INDEX IF NOT EXISTS idx_deals_type_created ON deals(deal_type, created_at);
            CREATE INDEX IF NOT EXISTS idx_deals_resort ON deals(resort_id);
            CREATE INDEX IF NOT EXISTS idx_snapshots_resort_date ON price_snapshots(resort_id, check_in_date);
            CREATE INDEX IF NOT EXISTS idx_training_action ON training_data(user_action);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn().execute_batch(sql)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves SQLite itself consistent
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a configured source, keeping its health counters if it already exists
    pub fn register_source(&self, name: &str, base_url: Option<&str>) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO deal_sources (name, base_url, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET base_url = excluded.base_url",
            params![name, base_url, timestamp(Utc::now())],
        )?;

        let id = conn.query_row(
            "SELECT id FROM deal_sources WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn find_source(&self, name: &str) -> Result<Option<Source>> {
        let conn = self.conn();
        let source = conn
            .query_row(
                "SELECT id, name, base_url, error_count, last_error, last_checked_at
                 FROM deal_sources WHERE name = ?1",
                params![name],
                |row| {
                    let last_checked_at: Option<String> = row.get(5)?;
                    Ok(Source {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        base_url: row.get(2)?,
                        error_count: row.get(3)?,
                        last_error: row.get(4)?,
                        last_checked_at: last_checked_at
                            .map(|s| parse_timestamp(5, &s))
                            .transpose()?,
                    })
                },
            )
            .optional()?;
        Ok(source)
    }

    /// Insert or update one deal by identity key. The lookup and write share a transaction.
    pub fn upsert_deal(
        &self,
        source_id: i64,
        key: &IdentityKey<'_>,
        deal: &ParsedDeal,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing: Option<i64> = match key {
            IdentityKey::Url(url) => tx
                .query_row(
                    "SELECT id FROM deals WHERE source_id = ?1 AND source_url = ?2 LIMIT 1",
                    params![source_id, url],
                    |row| row.get(0),
                )
                .optional()?,
            IdentityKey::TitleAndSource { title, source_id: owner } => tx
                .query_row(
                    "SELECT id FROM deals WHERE source_id = ?1 AND title = ?2 LIMIT 1",
                    params![owner, title],
                    |row| row.get(0),
                )
                .optional()?,
        };

        let outcome = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE deals SET
                        source_id = ?1, title = ?2, description = ?3, deal_type = ?4,
                        discount_percentage = ?5, deal_code = ?6, valid_from = ?7, valid_to = ?8,
                        travel_valid_from = ?9, travel_valid_to = ?10, dates_inferred = ?11,
                        source_url = ?12, updated_at = ?13
                     WHERE id = ?14",
                    params![
                        source_id,
                        deal.title,
                        deal.description,
                        deal.deal_type.as_str(),
                        deal.discount_percentage,
                        deal.deal_code,
                        date(deal.valid_from),
                        date(deal.valid_to),
                        date(deal.travel_valid_from),
                        date(deal.travel_valid_to),
                        deal.dates_inferred,
                        deal.source_url,
                        timestamp(now),
                        id,
                    ],
                )?;
                UpsertOutcome::Updated(id)
            }
            None => {
                tx.execute(
                    "INSERT INTO deals (
                        source_id, title, description, deal_type, discount_percentage, deal_code,
                        valid_from, valid_to, travel_valid_from, travel_valid_to, dates_inferred,
                        source_url, is_active, priority, ticket_required, dining_plan_included,
                        blackout_dates, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1, 0, 0, ?13, '[]', ?14, ?14)",
                    params![
                        source_id,
                        deal.title,
                        deal.description,
                        deal.deal_type.as_str(),
                        deal.discount_percentage,
                        deal.deal_code,
                        date(deal.valid_from),
                        date(deal.valid_to),
                        date(deal.travel_valid_from),
                        date(deal.travel_valid_to),
                        deal.dates_inferred,
                        deal.source_url,
                        deal.deal_type == DealType::FreeDining,
                        timestamp(now),
                    ],
                )?;
                UpsertOutcome::Inserted(tx.last_insert_rowid())
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// Record the outcome of a source run. Returns false for an unknown source.
    pub fn update_source_health(
        &self,
        name: &str,
        update: &HealthUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn();
        let changed = match update {
            HealthUpdate::Success => conn.execute(
                "UPDATE deal_sources SET last_checked_at = ?1, error_count = 0, last_error = NULL
                 WHERE name = ?2",
                params![timestamp(now), name],
            )?,
            HealthUpdate::Failure(message) => conn.execute(
                "UPDATE deal_sources SET last_checked_at = ?1, error_count = error_count + 1, last_error = ?2
                 WHERE name = ?3",
                params![timestamp(now), message, name],
            )?,
        };
        Ok(changed > 0)
    }

    pub fn get_deal(&self, id: i64) -> Result<Option<HistoricalDeal>> {
        let conn = self.conn();
        let deal = conn
            .query_row(
                &format!("SELECT {} FROM deals WHERE id = ?1", DEAL_COLUMNS),
                params![id],
                deal_from_row,
            )
            .optional()?;
        Ok(deal)
    }

    pub fn count_deals(&self) -> Result<usize> {
        let count: usize = self
            .conn()
            .query_row("SELECT COUNT(*) FROM deals", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn insert_resort(&self, resort: &Resort) -> Result<()> {
        self.conn().execute(
            "INSERT INTO resorts (id, name, resort_type) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, resort_type = excluded.resort_type",
            params![resort.id, resort.name, resort.resort_type],
        )?;
        Ok(())
    }

    /// Link a deal to the resort it applies to
    pub fn assign_resort(&self, deal_id: i64, resort_id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE deals SET resort_id = ?1 WHERE id = ?2",
            params![resort_id, deal_id],
        )?;
        Ok(())
    }

    pub fn append_price_snapshot(&self, snapshot: &PriceSnapshot, recorded_at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO price_snapshots (resort_id, check_in_date, price_per_night, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                snapshot.resort_id,
                date(snapshot.check_in_date),
                snapshot.price_per_night,
                timestamp(recorded_at),
            ],
        )?;
        Ok(())
    }

    pub fn record_training_action(
        &self,
        deal_id: i64,
        user_action: &str,
        action_timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO training_data (deal_id, user_action, action_timestamp) VALUES (?1, ?2, ?3)",
            params![deal_id, user_action, timestamp(action_timestamp)],
        )?;
        Ok(())
    }
}

impl HistoryReader for DealStore {
    fn query_deals(&self, filter: &DealFilter) -> Result<Vec<HistoricalDeal>> {
        let mut conditions = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(deal_type) = filter.deal_type {
            values.push(Value::Text(deal_type.as_str().to_string()));
            conditions.push(format!("deal_type = ?{}", values.len()));
        }
        if let Some(resort_id) = &filter.resort_id {
            values.push(Value::Text(resort_id.clone()));
            conditions.push(format!("resort_id = ?{}", values.len()));
        }
        if let Some(since) = filter.created_since {
            values.push(Value::Text(timestamp(since)));
            conditions.push(format!("created_at >= ?{}", values.len()));
        }
        if filter.discounted_only {
            conditions.push("discount_percentage IS NOT NULL".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM deals {} ORDER BY created_at ASC, id ASC",
            DEAL_COLUMNS, where_clause
        ))?;

        let deals = stmt.query_map(params_from_iter(values), deal_from_row)?;
        deals.collect::<Result<Vec<_>, _>>().map_err(|e| e.into())
    }

    fn query_price_snapshots(&self, filter: &SnapshotFilter) -> Result<Vec<PriceSnapshot>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT resort_id, check_in_date, price_per_night FROM price_snapshots
             WHERE resort_id = ?1 AND check_in_date >= ?2 AND check_in_date <= ?3
             ORDER BY check_in_date ASC, id ASC",
        )?;

        let snapshots = stmt.query_map(
            params![filter.resort_id, date(filter.from), date(filter.to)],
            |row| {
                let check_in: String = row.get(1)?;
                Ok(PriceSnapshot {
                    resort_id: row.get(0)?,
                    check_in_date: parse_date(1, &check_in)?,
                    price_per_night: row.get(2)?,
                })
            },
        )?;

        snapshots.collect::<Result<Vec<_>, _>>().map_err(|e| e.into())
    }

    fn query_training_data(&self, filter: &TrainingFilter) -> Result<Vec<TrainingRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT t.deal_id, t.user_action, t.action_timestamp, d.travel_valid_from, r.resort_type
             FROM training_data t
             JOIN deals d ON d.id = t.deal_id
             LEFT JOIN resorts r ON r.id = d.resort_id
             WHERE ?1 IS NULL OR t.user_action = ?1
             ORDER BY t.action_timestamp ASC",
        )?;

        let records = stmt.query_map(params![filter.user_action], |row| {
            let action_timestamp: String = row.get(2)?;
            let travel_valid_from: String = row.get(3)?;
            Ok(TrainingRecord {
                deal_id: row.get(0)?,
                user_action: row.get(1)?,
                action_timestamp: parse_timestamp(2, &action_timestamp)?,
                travel_valid_from: parse_date(3, &travel_valid_from)?,
                resort_type: row.get(4)?,
            })
        })?;

        records.collect::<Result<Vec<_>, _>>().map_err(|e| e.into())
    }
}

fn deal_from_row(row: &Row<'_>) -> rusqlite::Result<HistoricalDeal> {
    let deal_type: String = row.get(5)?;
    let blackout: String = row.get(18)?;
    let created_at: String = row.get(19)?;
    let updated_at: String = row.get(20)?;

    Ok(HistoricalDeal {
        id: row.get(0)?,
        source_id: row.get(1)?,
        resort_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        deal_type: deal_type
            .parse::<DealType>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?,
        discount_percentage: row.get(6)?,
        deal_code: row.get(7)?,
        valid_from: parse_date(8, &row.get::<_, String>(8)?)?,
        valid_to: parse_date(9, &row.get::<_, String>(9)?)?,
        travel_valid_from: parse_date(10, &row.get::<_, String>(10)?)?,
        travel_valid_to: parse_date(11, &row.get::<_, String>(11)?)?,
        dates_inferred: row.get(12)?,
        source_url: row.get(13)?,
        is_active: row.get(14)?,
        priority: row.get(15)?,
        ticket_required: row.get(16)?,
        dining_plan_included: row.get(17)?,
        blackout_dates: serde_json::from_str(&blackout)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(18, Type::Text, Box::new(e)))?,
        created_at: parse_timestamp(19, &created_at)?,
        updated_at: parse_timestamp(20, &updated_at)?,
    })
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
