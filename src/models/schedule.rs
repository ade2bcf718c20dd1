use std::fmt;

use chrono::{Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const SCHEDULE_SCHEMA_VERSION: u32 = 1;

pub const MIN_PERIODIC_MINUTES: u32 = 15;
pub const MAX_PERIODIC_MINUTES: u32 = 600;
pub const MAX_LIVE_MINUTES: u32 = 15;
pub const MIN_LIVE_SECONDS: u32 = 1;
pub const MAX_LIVE_SECONDS: u32 = 60;

/// Seven-bit weekday set. Sunday is the lowest bit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayMask(u8);

impl DayMask {
    pub const SUNDAY: DayMask = DayMask(1);
    pub const MONDAY: DayMask = DayMask(2);
    pub const TUESDAY: DayMask = DayMask(4);
    pub const WEDNESDAY: DayMask = DayMask(8);
    pub const THURSDAY: DayMask = DayMask(16);
    pub const FRIDAY: DayMask = DayMask(32);
    pub const SATURDAY: DayMask = DayMask(64);
    pub const ALL_DAYS: DayMask = DayMask(127);
    pub const WEEKDAYS: DayMask = DayMask(2 | 4 | 8 | 16 | 32);
    pub const WEEKENDS: DayMask = DayMask(1 | 64);
    pub const NONE: DayMask = DayMask(0);

    pub fn from_bits(bits: u8) -> Self {
        DayMask(bits & Self::ALL_DAYS.0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn of(day: Weekday) -> Self {
        DayMask(1 << day.num_days_from_sunday())
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & Self::of(day).0 != 0
    }

    pub fn with_day(self, day: Weekday, enabled: bool) -> Self {
        if enabled {
            DayMask(self.0 | Self::of(day).0)
        } else {
            DayMask(self.0 & !Self::of(day).0)
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 & Self::ALL_DAYS.0 == 0
    }
}

impl Default for DayMask {
    fn default() -> Self {
        Self::ALL_DAYS
    }
}

impl std::ops::BitOr for DayMask {
    type Output = DayMask;

    fn bitor(self, rhs: DayMask) -> DayMask {
        DayMask::from_bits(self.0 | rhs.0)
    }
}

const WEEK: [(Weekday, &str); 7] = [
    (Weekday::Sun, "Sun"),
    (Weekday::Mon, "Mon"),
    (Weekday::Tue, "Tue"),
    (Weekday::Wed, "Wed"),
    (Weekday::Thu, "Thu"),
    (Weekday::Fri, "Fri"),
    (Weekday::Sat, "Sat"),
];

impl fmt::Display for DayMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ALL_DAYS {
            return write!(f, "Every day");
        }
        if self.is_empty() {
            return write!(f, "Never");
        }
        let names: Vec<&str> = WEEK
            .iter()
            .filter(|(day, _)| self.contains(*day))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join(", "))
    }
}

impl fmt::Debug for DayMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DayMask({:07b})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeekParity {
    #[default]
    Both,
    Even,
    Odd,
}

impl WeekParity {
    pub fn accepts(self, iso_week: u32) -> bool {
        match self {
            WeekParity::Both => true,
            WeekParity::Even => iso_week % 2 == 0,
            WeekParity::Odd => iso_week % 2 == 1,
        }
    }
}

/// Interval gate: the cadence a schedule fires at on an eligible day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleType {
    SpecificHour {
        #[serde(default = "default_hour")]
        hour: u32,
        #[serde(default)]
        minute: u32,
    },
    Periodic {
        #[serde(default = "default_interval_minutes")]
        interval_minutes: u32,
    },
    LiveTracking {
        #[serde(default)]
        minutes: u32,
        #[serde(default = "default_live_seconds")]
        seconds: u32,
    },
}

fn default_hour() -> u32 {
    9
}

fn default_interval_minutes() -> u32 {
    60
}

fn default_live_seconds() -> u32 {
    30
}

impl Default for ScheduleType {
    fn default() -> Self {
        ScheduleType::Periodic {
            interval_minutes: default_interval_minutes(),
        }
    }
}

impl ScheduleType {
    /// Cadence for the recurring gates; `None` for a fixed hour.
    pub fn interval(&self) -> Option<Duration> {
        match *self {
            ScheduleType::SpecificHour { .. } => None,
            ScheduleType::Periodic { interval_minutes } => {
                Some(Duration::minutes(i64::from(interval_minutes)))
            }
            ScheduleType::LiveTracking { minutes, seconds } => {
                Some(Duration::seconds(i64::from(minutes) * 60 + i64::from(seconds)))
            }
        }
    }

    fn normalized(&self) -> Self {
        match *self {
            ScheduleType::SpecificHour { hour, minute } => ScheduleType::SpecificHour {
                hour: hour.min(23),
                minute: minute.min(59),
            },
            ScheduleType::Periodic { interval_minutes } => ScheduleType::Periodic {
                interval_minutes: interval_minutes.clamp(MIN_PERIODIC_MINUTES, MAX_PERIODIC_MINUTES),
            },
            ScheduleType::LiveTracking { minutes, seconds } => ScheduleType::LiveTracking {
                minutes: minutes.min(MAX_LIVE_MINUTES),
                seconds: seconds.clamp(MIN_LIVE_SECONDS, MAX_LIVE_SECONDS),
            },
        }
    }

    pub fn summary(&self) -> String {
        match *self {
            ScheduleType::SpecificHour { hour, minute } => format!("At {:02}:{:02}", hour, minute),
            ScheduleType::Periodic { interval_minutes } => {
                let hours = interval_minutes / 60;
                let mins = interval_minutes % 60;
                match (hours, mins) {
                    (0, m) => format!("Every {} min", m),
                    (1, 0) => "Every hour".to_string(),
                    (h, 0) => format!("Every {} hours", h),
                    (h, m) => format!("Every {}h {}m", h, m),
                }
            }
            ScheduleType::LiveTracking { minutes, seconds } => {
                if minutes == 0 {
                    format!("Every {}s", seconds)
                } else {
                    format!("Every {}m {}s", minutes, seconds)
                }
            }
        }
    }
}

/// Calendar gate: which days a schedule is eligible on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalendarScheduleType {
    #[default]
    AllTheTime,
    SelectedDay {
        date: NaiveDate,
    },
    DateRange {
        from: NaiveDate,
        to: NaiveDate,
    },
    EveryWeeks {
        #[serde(default)]
        days: DayMask,
        #[serde(default)]
        parity: WeekParity,
    },
}

impl CalendarScheduleType {
    fn normalized(&self) -> Self {
        match *self {
            CalendarScheduleType::DateRange { from, to } if from > to => {
                CalendarScheduleType::DateRange { from, to: from }
            }
            CalendarScheduleType::EveryWeeks { days, parity } => CalendarScheduleType::EveryWeeks {
                days: DayMask::from_bits(days.bits()),
                parity,
            },
            ref other => other.clone(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            CalendarScheduleType::AllTheTime => "All The Time".to_string(),
            CalendarScheduleType::SelectedDay { date } => date.format("%b %-d, %Y").to_string(),
            CalendarScheduleType::DateRange { from, to } => {
                format!("{} - {}", from.format("%b %-d"), to.format("%b %-d, %Y"))
            }
            CalendarScheduleType::EveryWeeks { days, parity } => {
                let suffix = match parity {
                    WeekParity::Both => "",
                    WeekParity::Even => " (Even weeks)",
                    WeekParity::Odd => " (Odd weeks)",
                };
                format!("{}{}", days, suffix)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default = "new_schedule_id")]
    pub id: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Display position only.
    #[serde(default)]
    pub order: u32,

    #[serde(default)]
    pub calendar: CalendarScheduleType,

    #[serde(default)]
    pub interval: ScheduleType,
}

fn new_schedule_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_enabled() -> bool {
    true
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            id: new_schedule_id(),
            enabled: true,
            order: 0,
            calendar: CalendarScheduleType::AllTheTime,
            interval: ScheduleType::default(),
        }
    }
}

impl Schedule {
    pub fn new(calendar: CalendarScheduleType, interval: ScheduleType) -> Self {
        Self {
            calendar,
            interval,
            ..Self::default()
        }
    }

    pub fn all_the_time(interval: ScheduleType) -> Self {
        Self::new(CalendarScheduleType::AllTheTime, interval)
    }

    pub fn selected_day(date: NaiveDate, interval: ScheduleType) -> Self {
        Self::new(CalendarScheduleType::SelectedDay { date }, interval)
    }

    pub fn date_range(from: NaiveDate, to: NaiveDate, interval: ScheduleType) -> Self {
        Self::new(CalendarScheduleType::DateRange { from, to }, interval)
    }

    pub fn every_weeks(days: DayMask, parity: WeekParity, interval: ScheduleType) -> Self {
        Self::new(CalendarScheduleType::EveryWeeks { days, parity }, interval)
    }

    pub fn default_list() -> Vec<Schedule> {
        vec![Schedule::default()]
    }

    /// Clamp every numeric field into its legal range and repair inverted
    /// date ranges. Evaluation only ever sees the normalized form.
    pub fn normalized(&self) -> Schedule {
        Schedule {
            id: self.id.clone(),
            enabled: self.enabled,
            order: self.order,
            calendar: self.calendar.normalized(),
            interval: self.interval.normalized(),
        }
    }

    pub fn label(&self) -> String {
        self.calendar.label()
    }

    pub fn summary(&self) -> String {
        self.interval.summary()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ScheduleDocument {
    #[serde(default = "current_version")]
    version: u32,
    #[serde(default)]
    schedules: Vec<Schedule>,
}

fn current_version() -> u32 {
    SCHEDULE_SCHEMA_VERSION
}

pub fn schedules_to_json(schedules: &[Schedule]) -> Result<String> {
    let doc = ScheduleDocument {
        version: SCHEDULE_SCHEMA_VERSION,
        schedules: schedules.to_vec(),
    };
    Ok(serde_json::to_string(&doc)?)
}

pub fn schedules_from_json(json: &str) -> Result<Vec<Schedule>> {
    let doc: ScheduleDocument = serde_json::from_str(json)?;
    if doc.version != SCHEDULE_SCHEMA_VERSION {
        return Err(AppError::Config(format!(
            "unsupported schedule schema version {}",
            doc.version
        )));
    }
    Ok(doc.schedules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn day_mask_bits_follow_sunday_first_layout() {
        assert_eq!(DayMask::of(Weekday::Sun).bits(), 1);
        assert_eq!(DayMask::of(Weekday::Mon).bits(), 2);
        assert_eq!(DayMask::of(Weekday::Sat).bits(), 64);
        let mask = DayMask::NONE.with_day(Weekday::Mon, true).with_day(Weekday::Wed, true);
        assert!(mask.contains(Weekday::Mon));
        assert!(!mask.contains(Weekday::Tue));
        assert_eq!(mask.to_string(), "Mon, Wed");
        assert!(mask.with_day(Weekday::Mon, false).with_day(Weekday::Wed, false).is_empty());
        assert_eq!(DayMask::from_bits(0xFF), DayMask::ALL_DAYS);
    }

    #[test]
    fn normalization_clamps_intervals() {
        let s = Schedule::all_the_time(ScheduleType::Periodic { interval_minutes: 5 }).normalized();
        assert_eq!(s.interval, ScheduleType::Periodic { interval_minutes: 15 });

        let s = Schedule::all_the_time(ScheduleType::LiveTracking { minutes: 40, seconds: 0 }).normalized();
        assert_eq!(s.interval, ScheduleType::LiveTracking { minutes: 15, seconds: 1 });

        let s = Schedule::all_the_time(ScheduleType::SpecificHour { hour: 30, minute: 75 }).normalized();
        assert_eq!(s.interval, ScheduleType::SpecificHour { hour: 23, minute: 59 });
    }

    #[test]
    fn inverted_range_collapses_to_single_day() {
        let s = Schedule::date_range(date(2026, 1, 10), date(2026, 1, 5), ScheduleType::default())
            .normalized();
        assert_eq!(
            s.calendar,
            CalendarScheduleType::DateRange { from: date(2026, 1, 10), to: date(2026, 1, 10) }
        );
    }

    #[test]
    fn json_uses_names_and_fills_defaults() {
        let json = r#"{"version":1,"schedules":[
            {"calendar":{"type":"EVERY_WEEKS","days":2,"parity":"EVEN"},
             "interval":{"type":"SPECIFIC_HOUR","hour":7}}
        ]}"#;
        let schedules = schedules_from_json(json).unwrap();
        assert_eq!(schedules.len(), 1);
        let s = &schedules[0];
        assert!(s.enabled);
        assert!(!s.id.is_empty());
        assert_eq!(s.interval, ScheduleType::SpecificHour { hour: 7, minute: 0 });
        assert_eq!(
            s.calendar,
            CalendarScheduleType::EveryWeeks { days: DayMask::MONDAY, parity: WeekParity::Even }
        );

        let out = schedules_to_json(&schedules).unwrap();
        assert!(out.contains("\"EVERY_WEEKS\""));
        assert!(out.contains("\"SPECIFIC_HOUR\""));
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let err = schedules_from_json(r#"{"version":7,"schedules":[]}"#);
        assert!(matches!(err, Err(AppError::Config(_))));
    }

    #[test]
    fn labels_and_summaries() {
        let s = Schedule::every_weeks(
            DayMask::MONDAY | DayMask::WEDNESDAY,
            WeekParity::Even,
            ScheduleType::Periodic { interval_minutes: 150 },
        );
        assert_eq!(s.label(), "Mon, Wed (Even weeks)");
        assert_eq!(s.summary(), "Every 2h 30m");
        assert_eq!(ScheduleType::SpecificHour { hour: 9, minute: 5 }.summary(), "At 09:05");
        assert_eq!(ScheduleType::LiveTracking { minutes: 1, seconds: 30 }.summary(), "Every 1m 30s");
        assert_eq!(ScheduleType::Periodic { interval_minutes: 60 }.summary(), "Every hour");
    }
}
