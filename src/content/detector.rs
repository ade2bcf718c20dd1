use std::time::Duration;

use similar::{Algorithm, ChangeTag, TextDiff};

use crate::models::{ChangeVerdict, ComparisonConfig, DiffAlgorithm, Snapshot};

/// Past this the diff stops looking for a minimal edit script and the counts
/// may overshoot.
const DIFF_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_DIFF_TEXT_LINES: usize = 200;

#[derive(Debug, Default)]
struct UnitDiff {
    added: usize,
    removed: usize,
    previous_units: usize,
    /// Changed runs in document order, deletions before insertions.
    runs: Vec<(ChangeTag, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeDetector {
    threshold_percent: u8,
    algorithm: DiffAlgorithm,
}

impl ChangeDetector {
    pub fn new(threshold_percent: u8) -> Self {
        Self {
            threshold_percent: threshold_percent.min(100),
            algorithm: DiffAlgorithm::Line,
        }
    }

    pub fn for_config(config: &ComparisonConfig) -> Self {
        Self::new(config.threshold_percent).with_algorithm(config.diff_algorithm)
    }

    pub fn with_algorithm(mut self, algorithm: DiffAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn threshold_percent(&self) -> u8 {
        self.threshold_percent
    }

    pub fn compare(&self, previous: &Snapshot, current: &Snapshot) -> ChangeVerdict {
        if previous.content_hash == current.content_hash {
            return ChangeVerdict::unchanged(current.size);
        }

        let diff = diff_units(&previous.content, &current.content, self.algorithm);
        let change_percent = change_percent(diff.added + diff.removed, diff.previous_units);
        let has_changes = diff.added + diff.removed > 0;
        let exceeds_threshold = has_changes && change_percent >= self.threshold_percent;

        tracing::debug!(
            "Compared by {}: +{} -{} of {} ({}%)",
            self.algorithm.as_str(),
            diff.added,
            diff.removed,
            diff.previous_units,
            change_percent
        );

        ChangeVerdict {
            change_percent,
            unit: self.algorithm,
            added_lines: diff.added,
            removed_lines: diff.removed,
            diff: render_diff(&diff.runs),
            exceeds_threshold,
            old_size: previous.size,
            new_size: current.size,
        }
    }
}

fn change_percent(changed_units: usize, previous_units: usize) -> u8 {
    let percent = changed_units.saturating_mul(100) / previous_units.max(1);
    percent.min(100) as u8
}

fn diff_units(old: &str, new: &str, algorithm: DiffAlgorithm) -> UnitDiff {
    let mut config = TextDiff::configure();
    config.algorithm(Algorithm::Myers).timeout(DIFF_TIMEOUT);

    match algorithm {
        // Split on '\n' so empty content is one empty line.
        DiffAlgorithm::Line => {
            let old_lines: Vec<&str> = old.split('\n').collect();
            let new_lines: Vec<&str> = new.split('\n').collect();
            summarize(&config.diff_slices(&old_lines[..], &new_lines[..]), algorithm)
        }
        DiffAlgorithm::Word => {
            let old_words: Vec<&str> = old.split_whitespace().collect();
            let new_words: Vec<&str> = new.split_whitespace().collect();
            summarize(&config.diff_slices(&old_words[..], &new_words[..]), algorithm)
        }
        DiffAlgorithm::Character => summarize(&config.diff_chars(old, new), algorithm),
    }
}

fn summarize<'a>(diff: &TextDiff<'a, 'a, 'a, str>, algorithm: DiffAlgorithm) -> UnitDiff {
    let mut out = UnitDiff {
        previous_units: diff.old_slices().len(),
        ..UnitDiff::default()
    };

    let mut contiguous = false;
    for change in diff.iter_all_changes() {
        let tag = change.tag();
        match tag {
            ChangeTag::Equal => {
                contiguous = false;
                continue;
            }
            ChangeTag::Delete => out.removed += 1,
            ChangeTag::Insert => out.added += 1,
        }

        let value = change.value();
        match out.runs.last_mut() {
            // Words and characters read better as runs than one per line.
            Some((last, text)) if contiguous && *last == tag && algorithm != DiffAlgorithm::Line => {
                if algorithm == DiffAlgorithm::Word {
                    text.push(' ');
                }
                text.push_str(value);
            }
            _ => out.runs.push((tag, value.to_string())),
        }
        contiguous = true;
    }
    out
}

fn render_diff(runs: &[(ChangeTag, String)]) -> String {
    let mut lines: Vec<String> = runs
        .iter()
        .take(MAX_DIFF_TEXT_LINES)
        .map(|(tag, text)| match tag {
            ChangeTag::Delete => format!("- {}", text),
            _ => format!("+ {}", text),
        })
        .collect();
    if runs.len() > MAX_DIFF_TEXT_LINES {
        lines.push(format!("... {} more", runs.len() - MAX_DIFF_TEXT_LINES));
    }
    lines.join("\n")
}
