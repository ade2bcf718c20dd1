use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::schedule::{schedules_from_json, schedules_to_json};
use crate::models::{CheckRecord, ComparisonConfig, FetchStrategy, MonitoredItem, NewItem, Snapshot};

use super::schema::SCHEMA;
use super::ItemStore;

const ITEM_COLUMNS: &str = "id, name, url, fetch_strategy, comparison, schedules, enabled, last_check, \
     last_change_percent, last_error, consecutive_failures, created_at, updated_at";

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Item operations

    pub async fn insert_item(&self, item: NewItem) -> Result<i64> {
        let comparison = serde_json::to_string(&item.comparison)?;
        let schedules = schedules_to_json(&item.schedules)?;
        let now = Utc::now().to_rfc3339();

        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO items (name, url, fetch_strategy, comparison, schedules, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)"#,
                    params![
                        item.name,
                        item.url,
                        item.fetch_strategy.as_str(),
                        comparison,
                        schedules,
                        now
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn load_all_items(&self) -> Result<Vec<MonitoredItem>> {
        self.query_items(format!("SELECT {} FROM items ORDER BY id", ITEM_COLUMNS))
            .await
    }

    async fn query_items(&self, sql: String) -> Result<Vec<MonitoredItem>> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], item_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        // A row that no longer decodes is skipped so the healthy ones stay reachable.
        let items = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                match row.into_item() {
                    Ok(item) => Some(item),
                    Err(e) => {
                        tracing::warn!("Skipping item {}: {}", id, e);
                        None
                    }
                }
            })
            .collect();
        Ok(items)
    }

    // Check history

    pub async fn recent_checks(&self, item_id: i64, limit: usize) -> Result<Vec<CheckRecord>> {
        let checks = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT item_id, checked_at, success, change_percent, error, response_time_ms
                       FROM check_results WHERE item_id = ?1
                       ORDER BY id DESC LIMIT ?2"#,
                )?;
                let checks = stmt
                    .query_map(params![item_id, limit as i64], check_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(checks)
            })
            .await?;
        Ok(checks)
    }

    pub async fn snapshot_count(&self, item_id: i64) -> Result<usize> {
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM snapshots WHERE item_id = ?1",
                    params![item_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count.max(0) as usize)
    }

    #[cfg(test)]
    pub(crate) async fn execute(&self, sql: &'static str) -> Result<usize> {
        let changed = self.conn.call(move |conn| Ok(conn.execute(sql, [])?)).await?;
        Ok(changed)
    }
}

#[async_trait]
impl ItemStore for Repository {
    async fn load_item(&self, id: i64) -> Result<Option<MonitoredItem>> {
        let sql = format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS);
        let row = self
            .conn
            .call(move |conn| {
                let row = conn.query_row(&sql, params![id], item_row).optional()?;
                Ok(row)
            })
            .await?;

        row.map(ItemRow::into_item).transpose()
    }

    async fn load_all_enabled_items(&self) -> Result<Vec<MonitoredItem>> {
        self.query_items(format!(
            "SELECT {} FROM items WHERE enabled = 1 ORDER BY id",
            ITEM_COLUMNS
        ))
        .await
    }

    async fn load_latest_snapshot(&self, item_id: i64) -> Result<Option<Snapshot>> {
        let snapshot = self
            .conn
            .call(move |conn| {
                let snapshot = conn
                    .query_row(
                        r#"SELECT content, content_hash, size, captured_at FROM snapshots
                           WHERE item_id = ?1 ORDER BY id DESC LIMIT 1"#,
                        params![item_id],
                        snapshot_from_row,
                    )
                    .optional()?;
                Ok(snapshot)
            })
            .await?;
        Ok(snapshot)
    }

    async fn save_snapshot(&self, item_id: i64, snapshot: &Snapshot, retain: u32) -> Result<()> {
        let snapshot = snapshot.clone();
        let retain = retain.max(1) as i64;

        let pruned = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    r#"INSERT INTO snapshots (item_id, content, content_hash, size, captured_at)
                       VALUES (?1, ?2, ?3, ?4, ?5)"#,
                    params![
                        item_id,
                        snapshot.content,
                        snapshot.content_hash,
                        snapshot.size as i64,
                        snapshot.captured_at.to_rfc3339()
                    ],
                )?;
                let pruned = tx.execute(
                    r#"DELETE FROM snapshots WHERE item_id = ?1 AND id NOT IN (
                           SELECT id FROM snapshots WHERE item_id = ?1 ORDER BY id DESC LIMIT ?2
                       )"#,
                    params![item_id, retain],
                )?;
                tx.commit()?;
                Ok(pruned)
            })
            .await?;

        if pruned > 0 {
            tracing::debug!("Pruned {} old snapshots for item {}", pruned, item_id);
        }
        Ok(())
    }

    async fn record_check(&self, record: &CheckRecord) -> Result<()> {
        let record = record.clone();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let checked_at = record.checked_at.to_rfc3339();
                tx.execute(
                    r#"INSERT INTO check_results (item_id, checked_at, success, change_percent, error, response_time_ms)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                    params![
                        record.item_id,
                        checked_at,
                        record.success,
                        record.change_percent,
                        record.error,
                        record.response_time_ms as i64
                    ],
                )?;
                if record.success {
                    tx.execute(
                        r#"UPDATE items SET last_check = ?2, last_change_percent = ?3, last_error = NULL,
                               consecutive_failures = 0, updated_at = ?2
                           WHERE id = ?1"#,
                        params![record.item_id, checked_at, record.change_percent],
                    )?;
                } else {
                    tx.execute(
                        r#"UPDATE items SET last_check = ?2, last_error = ?3,
                               consecutive_failures = consecutive_failures + 1, updated_at = ?2
                           WHERE id = ?1"#,
                        params![record.item_id, checked_at, record.error],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn set_enabled(&self, id: i64, enabled: bool) -> Result<bool> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE items SET enabled = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, enabled, Utc::now().to_rfc3339()],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed > 0)
    }

    async fn delete_item(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute("DELETE FROM items WHERE id = ?1", params![id])?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted > 0)
    }
}

/// Raw column values; JSON columns are decoded outside the connection thread.
struct ItemRow {
    id: i64,
    name: String,
    url: String,
    fetch_strategy: String,
    comparison: String,
    schedules: String,
    enabled: bool,
    last_check: Option<String>,
    last_change_percent: i64,
    last_error: Option<String>,
    consecutive_failures: i64,
    created_at: String,
    updated_at: String,
}

impl ItemRow {
    fn into_item(self) -> Result<MonitoredItem> {
        let fetch_strategy = FetchStrategy::parse(&self.fetch_strategy).ok_or_else(|| {
            AppError::Config(format!(
                "item {}: unknown fetch strategy {}",
                self.id, self.fetch_strategy
            ))
        })?;
        let comparison: ComparisonConfig = serde_json::from_str(&self.comparison)?;
        let schedules = schedules_from_json(&self.schedules)?;

        Ok(MonitoredItem {
            id: self.id,
            name: self.name,
            url: self.url,
            fetch_strategy,
            comparison,
            schedules,
            enabled: self.enabled,
            last_check: self.last_check.as_deref().and_then(parse_datetime),
            last_change_percent: self.last_change_percent.clamp(0, 100) as u8,
            last_error: self.last_error,
            consecutive_failures: self.consecutive_failures.max(0) as u32,
            created_at: parse_datetime(&self.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_datetime(&self.updated_at).unwrap_or_else(Utc::now),
        })
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn item_row(row: &Row) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        fetch_strategy: row.get(3)?,
        comparison: row.get(4)?,
        schedules: row.get(5)?,
        enabled: row.get(6)?,
        last_check: row.get(7)?,
        last_change_percent: row.get(8)?,
        last_error: row.get(9)?,
        consecutive_failures: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn snapshot_from_row(row: &Row) -> rusqlite::Result<Snapshot> {
    let captured_at: String = row.get(3)?;
    Ok(Snapshot {
        content: row.get(0)?,
        content_hash: row.get(1)?,
        size: row.get::<_, i64>(2)?.max(0) as usize,
        captured_at: parse_datetime(&captured_at).unwrap_or_else(Utc::now),
    })
}

fn check_from_row(row: &Row) -> rusqlite::Result<CheckRecord> {
    let checked_at: String = row.get(1)?;
    Ok(CheckRecord {
        item_id: row.get(0)?,
        checked_at: parse_datetime(&checked_at).unwrap_or_else(Utc::now),
        success: row.get(2)?,
        change_percent: row.get::<_, i64>(3)?.clamp(0, 100) as u8,
        error: row.get(4)?,
        response_time_ms: row.get::<_, i64>(5)?.max(0) as u64,
    })
}
