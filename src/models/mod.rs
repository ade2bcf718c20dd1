mod check;
mod item;
pub mod schedule;
mod snapshot;

pub use check::CheckRecord;
pub use item::{
    ComparisonConfig, ComparisonMode, DiffAlgorithm, FetchStrategy, MonitoredItem, NewItem, TextGate,
    DEFAULT_MIN_TEXT_LENGTH, DEFAULT_MIN_WORD_LENGTH, DEFAULT_THRESHOLD_PERCENT,
};
pub use schedule::{CalendarScheduleType, DayMask, Schedule, ScheduleType, WeekParity};
pub use snapshot::{content_hash, ChangeVerdict, Snapshot};
