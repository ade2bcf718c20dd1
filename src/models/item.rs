use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::schedule::Schedule;

pub const DEFAULT_THRESHOLD_PERCENT: u8 = 5;
pub const DEFAULT_MIN_TEXT_LENGTH: usize = 10;
pub const DEFAULT_MIN_WORD_LENGTH: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchStrategy {
    #[default]
    Static,
    /// Rendered by a browser engine that can replay page-interaction macros.
    Scripted,
}

impl FetchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStrategy::Static => "STATIC",
            FetchStrategy::Scripted => "SCRIPTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STATIC" => Some(FetchStrategy::Static),
            "SCRIPTED" => Some(FetchStrategy::Scripted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonMode {
    #[default]
    FullHtml,
    TextOnly,
    CssSelector,
}

/// Unit the change percentage is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffAlgorithm {
    #[default]
    Line,
    Word,
    Character,
}

impl DiffAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffAlgorithm::Line => "LINE",
            DiffAlgorithm::Word => "WORD",
            DiffAlgorithm::Character => "CHARACTER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LINE" => Some(DiffAlgorithm::Line),
            "WORD" => Some(DiffAlgorithm::Word),
            "CHARACTER" | "CHAR" => Some(DiffAlgorithm::Character),
            _ => None,
        }
    }
}

/// Inconclusive-snapshot gate for `TEXT_ONLY` comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextGate {
    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,
    #[serde(default = "default_min_word_length")]
    pub min_word_length: usize,
}

fn default_min_text_length() -> usize {
    DEFAULT_MIN_TEXT_LENGTH
}

fn default_min_word_length() -> usize {
    DEFAULT_MIN_WORD_LENGTH
}

impl Default for TextGate {
    fn default() -> Self {
        Self {
            min_text_length: DEFAULT_MIN_TEXT_LENGTH,
            min_word_length: DEFAULT_MIN_WORD_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComparisonConfig {
    #[serde(default)]
    pub mode: ComparisonMode,
    #[serde(default)]
    pub include_selector: Option<String>,
    #[serde(default)]
    pub exclude_selector: Option<String>,
    #[serde(default = "default_threshold")]
    pub threshold_percent: u8,
    #[serde(default)]
    pub text_gate: TextGate,
    #[serde(default)]
    pub diff_algorithm: DiffAlgorithm,
}

fn default_threshold() -> u8 {
    DEFAULT_THRESHOLD_PERCENT
}

impl ComparisonConfig {
    pub fn full_html() -> Self {
        Self {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            ..Self::default()
        }
    }

    pub fn text_only(text_gate: TextGate) -> Self {
        Self {
            mode: ComparisonMode::TextOnly,
            text_gate,
            ..Self::full_html()
        }
    }

    pub fn css_selector(include: Option<String>, exclude: Option<String>) -> Self {
        Self {
            mode: ComparisonMode::CssSelector,
            include_selector: include,
            exclude_selector: exclude,
            ..Self::full_html()
        }
    }

    pub fn with_threshold(mut self, percent: u8) -> Self {
        self.threshold_percent = percent.min(100);
        self
    }

    pub fn with_diff_algorithm(mut self, algorithm: DiffAlgorithm) -> Self {
        self.diff_algorithm = algorithm;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredItem {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub fetch_strategy: FetchStrategy,
    pub comparison: ComparisonConfig,
    pub schedules: Vec<Schedule>,
    pub enabled: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_change_percent: u8,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub url: String,
    pub fetch_strategy: FetchStrategy,
    pub comparison: ComparisonConfig,
    pub schedules: Vec<Schedule>,
}

impl NewItem {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: url.clone(),
            url,
            fetch_strategy: FetchStrategy::Static,
            comparison: ComparisonConfig::full_html(),
            schedules: Schedule::default_list(),
        }
    }

    pub fn with_comparison(mut self, comparison: ComparisonConfig) -> Self {
        self.comparison = comparison;
        self
    }

    pub fn with_schedules(mut self, schedules: Vec<Schedule>) -> Self {
        self.schedules = schedules;
        self
    }
}
