mod repository;
mod schema;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CheckRecord, MonitoredItem, Snapshot};

pub use repository::Repository;

/// Persistence collaborator used by the check engine.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn load_item(&self, id: i64) -> Result<Option<MonitoredItem>>;

    async fn load_all_enabled_items(&self) -> Result<Vec<MonitoredItem>>;

    async fn load_latest_snapshot(&self, item_id: i64) -> Result<Option<Snapshot>>;

    /// Append a snapshot, then keep only the newest `retain` for the item.
    async fn save_snapshot(&self, item_id: i64, snapshot: &Snapshot, retain: u32) -> Result<()>;

    /// Store the check row and update the item's bookkeeping columns.
    async fn record_check(&self, record: &CheckRecord) -> Result<()>;

    /// Returns false when the item does not exist.
    async fn set_enabled(&self, id: i64, enabled: bool) -> Result<bool>;

    /// Returns false when the item does not exist.
    async fn delete_item(&self, id: i64) -> Result<bool>;
}
