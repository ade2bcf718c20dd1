pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- monitored items; comparison and schedules are JSON documents
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    fetch_strategy TEXT NOT NULL DEFAULT 'STATIC',
    comparison TEXT NOT NULL,
    schedules TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    last_check TEXT,
    last_change_percent INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_items_enabled ON items(enabled);

-- normalized snapshot history, newest has the highest id
CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    size INTEGER NOT NULL,
    captured_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_item_id ON snapshots(item_id, id DESC);

-- one row per completed check cycle
CREATE TABLE IF NOT EXISTS check_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    checked_at TEXT NOT NULL,
    success INTEGER NOT NULL,
    change_percent INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    response_time_ms INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_check_results_item_id ON check_results(item_id, checked_at DESC);
"#;
