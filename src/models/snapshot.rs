use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::item::DiffAlgorithm;

/// One captured, normalized fetch. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub content: String,
    pub content_hash: String,
    pub size: usize,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn capture(content: String, captured_at: DateTime<Utc>) -> Self {
        let content_hash = content_hash(&content);
        let size = content.len();
        Self {
            content,
            content_hash,
            size,
            captured_at,
        }
    }
}

pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{digest:x}")
}

/// Result of comparing two normalized contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeVerdict {
    pub change_percent: u8,
    /// Added and removed counts are in this unit.
    #[serde(default)]
    pub unit: DiffAlgorithm,
    pub added_lines: usize,
    pub removed_lines: usize,
    pub diff: String,
    pub exceeds_threshold: bool,
    pub old_size: usize,
    pub new_size: usize,
}

impl ChangeVerdict {
    pub fn unchanged(size: usize) -> Self {
        Self {
            change_percent: 0,
            unit: DiffAlgorithm::Line,
            added_lines: 0,
            removed_lines: 0,
            diff: String::new(),
            exceeds_threshold: false,
            old_size: size,
            new_size: size,
        }
    }

    pub fn has_changes(&self) -> bool {
        self.added_lines + self.removed_lines > 0
    }

    pub fn description(&self) -> String {
        if !self.has_changes() {
            return "No changes detected".to_string();
        }
        let unit = match self.unit {
            DiffAlgorithm::Line => "line",
            DiffAlgorithm::Word => "word",
            DiffAlgorithm::Character => "character",
        };
        format!(
            "{} {}{} added, {} removed ({}%)",
            self.added_lines,
            unit,
            if self.added_lines == 1 { "" } else { "s" },
            self.removed_lines,
            self.change_percent
        )
    }
}
