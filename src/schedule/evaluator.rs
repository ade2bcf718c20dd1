//! Pure schedule evaluation: calendar gate first, then interval gate.
//!
//! Everything here is generic over the time zone so that "today" means the
//! user's local calendar day. Nothing in this module reads the clock.

use std::cmp::max;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::models::{CalendarScheduleType, MonitoredItem, Schedule, ScheduleType};

/// Upper bound on the number of eligible days inspected by `next_due_at`.
const MAX_DAYS_SCANNED: usize = 400;

/// Longest stretch between two days that can satisfy an `EVERY_WEEKS` gate
/// (parity flips irregularly around ISO week 53).
const WEEKLY_SCAN_DAYS: usize = 28;

pub fn is_calendar_eligible(calendar: &CalendarScheduleType, date: NaiveDate) -> bool {
    match *calendar {
        CalendarScheduleType::AllTheTime => true,
        CalendarScheduleType::SelectedDay { date: selected } => date == selected,
        CalendarScheduleType::DateRange { from, to } => date >= from && date <= max(from, to),
        CalendarScheduleType::EveryWeeks { days, parity } => {
            !days.is_empty()
                && parity.accepts(date.iso_week().week())
                && days.contains(date.weekday())
        }
    }
}

/// First calendar-eligible date on or after `from`, if there is one.
pub fn next_eligible_date(calendar: &CalendarScheduleType, from: NaiveDate) -> Option<NaiveDate> {
    match *calendar {
        CalendarScheduleType::AllTheTime => Some(from),
        CalendarScheduleType::SelectedDay { date } => (date >= from).then_some(date),
        CalendarScheduleType::DateRange { from: start, to } => {
            let end = max(start, to);
            let day = max(from, start);
            (day <= end).then_some(day)
        }
        CalendarScheduleType::EveryWeeks { days, .. } => {
            if days.is_empty() {
                return None;
            }
            from.iter_days()
                .take(WEEKLY_SCAN_DAYS)
                .find(|day| is_calendar_eligible(calendar, *day))
        }
    }
}

/// Whether the schedule wants a check at `now`, given the item's last check.
pub fn is_due<Tz: TimeZone>(
    schedule: &Schedule,
    now: &DateTime<Tz>,
    last_check: Option<DateTime<Utc>>,
) -> bool {
    let schedule = schedule.normalized();
    if !schedule.enabled {
        return false;
    }
    if !is_calendar_eligible(&schedule.calendar, now.date_naive()) {
        return false;
    }
    interval_due(&schedule.interval, now, last_check)
}

fn interval_due<Tz: TimeZone>(
    interval: &ScheduleType,
    now: &DateTime<Tz>,
    last_check: Option<DateTime<Utc>>,
) -> bool {
    let now_utc = now.with_timezone(&Utc);
    match *interval {
        ScheduleType::SpecificHour { hour, minute } => {
            let Some(fire) = fire_instant(&now.timezone(), now.date_naive(), hour, minute) else {
                return false;
            };
            let fire = fire.with_timezone(&Utc);
            now_utc >= fire && last_check.map_or(true, |last| last < fire)
        }
        ScheduleType::Periodic { .. } | ScheduleType::LiveTracking { .. } => {
            let Some(step) = interval.interval() else {
                return false;
            };
            match last_check {
                None => true,
                Some(last) => now_utc - last >= step,
            }
        }
    }
}

/// Earliest instant at or after `now` when the schedule is due. Returns `now`
/// when it is due already and `None` when it can never fire again.
pub fn next_due_at<Tz: TimeZone>(
    schedule: &Schedule,
    now: &DateTime<Tz>,
    last_check: Option<DateTime<Utc>>,
) -> Option<DateTime<Tz>> {
    let schedule = schedule.normalized();
    if !schedule.enabled {
        return None;
    }
    if is_due(&schedule, now, last_check) {
        return Some(now.clone());
    }

    let tz = now.timezone();
    let mut cursor = now.date_naive();
    for _ in 0..MAX_DAYS_SCANNED {
        let day = next_eligible_date(&schedule.calendar, cursor)?;
        if let Some(at) = candidate_on(&schedule.interval, &tz, day, now, last_check) {
            return Some(at);
        }
        cursor = day.succ_opt()?;
    }
    None
}

fn candidate_on<Tz: TimeZone>(
    interval: &ScheduleType,
    tz: &Tz,
    day: NaiveDate,
    now: &DateTime<Tz>,
    last_check: Option<DateTime<Utc>>,
) -> Option<DateTime<Tz>> {
    match *interval {
        ScheduleType::SpecificHour { hour, minute } => {
            let fire = fire_instant(tz, day, hour, minute)?;
            let fire_utc = fire.with_timezone(&Utc);
            let fresh = last_check.map_or(true, |last| last < fire_utc);
            (fire > *now && fresh).then_some(fire)
        }
        ScheduleType::Periodic { .. } | ScheduleType::LiveTracking { .. } => {
            let step = interval.interval()?;
            let earliest = match last_check {
                Some(last) => (last + step).with_timezone(tz),
                None => now.clone(),
            };
            let day_start = local_instant(tz, day.and_hms_opt(0, 0, 0)?)?;
            let candidate = max(max(earliest, day_start), now.clone());
            (candidate.date_naive() == day).then_some(candidate)
        }
    }
}

fn fire_instant<Tz: TimeZone>(tz: &Tz, day: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Tz>> {
    local_instant(tz, day.and_hms_opt(hour, minute, 0)?)
}

/// Resolve a wall-clock time; times skipped by a DST jump move forward an hour.
fn local_instant<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
}

/// An item is due when it is enabled and any of its enabled schedules is due.
pub fn item_is_due<Tz: TimeZone>(item: &MonitoredItem, now: &DateTime<Tz>) -> bool {
    item.enabled
        && item
            .schedules
            .iter()
            .any(|schedule| is_due(schedule, now, item.last_check))
}

pub fn next_item_due_at<Tz: TimeZone>(item: &MonitoredItem, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    if !item.enabled {
        return None;
    }
    item.schedules
        .iter()
        .filter_map(|schedule| next_due_at(schedule, now, item.last_check))
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComparisonConfig, DayMask, FetchStrategy, WeekParity};
    use chrono::{Timelike, Weekday};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn hourly() -> ScheduleType {
        ScheduleType::Periodic { interval_minutes: 60 }
    }

    fn item_with(schedules: Vec<Schedule>, last_check: Option<DateTime<Utc>>) -> MonitoredItem {
        let now = Utc::now();
        MonitoredItem {
            id: 1,
            name: "test".to_string(),
            url: "https://example.com".to_string(),
            fetch_strategy: FetchStrategy::Static,
            comparison: ComparisonConfig::full_html(),
            schedules,
            enabled: true,
            last_check,
            last_change_percent: 0,
            last_error: None,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn periodic_boundary_is_inclusive() {
        let schedule = Schedule::all_the_time(hourly());
        let now = at(2026, 3, 2, 12, 0);
        assert!(!is_due(&schedule, &now, Some(now - Duration::minutes(59))));
        assert!(is_due(&schedule, &now, Some(now - Duration::minutes(60))));
    }

    #[test]
    fn never_checked_is_always_due() {
        let schedule = Schedule::all_the_time(hourly());
        assert!(is_due(&schedule, &at(2026, 3, 2, 0, 1), None));
    }

    #[test]
    fn periodic_interval_below_floor_is_clamped() {
        let schedule = Schedule::all_the_time(ScheduleType::Periodic { interval_minutes: 1 });
        let now = at(2026, 3, 2, 12, 0);
        assert!(!is_due(&schedule, &now, Some(now - Duration::minutes(14))));
        assert!(is_due(&schedule, &now, Some(now - Duration::minutes(15))));
    }

    #[test]
    fn live_tracking_uses_minutes_and_seconds() {
        let schedule = Schedule::all_the_time(ScheduleType::LiveTracking { minutes: 1, seconds: 30 });
        let now = at(2026, 3, 2, 12, 0);
        assert!(!is_due(&schedule, &now, Some(now - Duration::seconds(89))));
        assert!(is_due(&schedule, &now, Some(now - Duration::seconds(90))));
    }

    #[test]
    fn specific_hour_fires_once_per_day() {
        let schedule = Schedule::all_the_time(ScheduleType::SpecificHour { hour: 9, minute: 0 });
        assert!(!is_due(&schedule, &at(2026, 3, 2, 8, 59), None));
        assert!(is_due(&schedule, &at(2026, 3, 2, 9, 0), None));
        assert!(is_due(&schedule, &at(2026, 3, 2, 15, 0), Some(at(2026, 3, 1, 9, 0))));
        assert!(!is_due(&schedule, &at(2026, 3, 2, 15, 0), Some(at(2026, 3, 2, 9, 1))));
    }

    #[test]
    fn monday_even_weeks_only() {
        let schedule = Schedule::every_weeks(DayMask::MONDAY, WeekParity::Even, hourly());
        let mut day = date(2025, 12, 1);
        while day <= date(2027, 2, 1) {
            let now = Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap());
            let expected = day.weekday() == Weekday::Mon && day.iso_week().week() % 2 == 0;
            assert_eq!(is_due(&schedule, &now, None), expected, "{}", day);
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn empty_day_mask_never_fires() {
        let schedule = Schedule::every_weeks(DayMask::NONE, WeekParity::Both, hourly());
        let now = at(2026, 1, 5, 12, 0);
        assert!(!is_due(&schedule, &now, None));
        assert_eq!(next_due_at(&schedule, &now, None), None);
    }

    #[test]
    fn inverted_date_range_is_single_day() {
        let schedule = Schedule::date_range(date(2026, 1, 10), date(2026, 1, 5), hourly());
        for d in 4..=12 {
            let now = at(2026, 1, d, 12, 0);
            assert_eq!(is_due(&schedule, &now, None), d == 10, "Jan {}", d);
        }
    }

    #[test]
    fn selected_day_is_due_only_on_its_date() {
        let schedule = Schedule::selected_day(date(2026, 1, 10), hourly());
        assert!(is_due(&schedule, &at(2026, 1, 10, 8, 0), None));
        assert!(!is_due(&schedule, &at(2026, 1, 9, 23, 59), None));
        assert!(!is_due(&schedule, &at(2026, 1, 11, 0, 0), None));

        let now = at(2026, 1, 5, 12, 0);
        assert_eq!(next_due_at(&schedule, &now, None), Some(at(2026, 1, 10, 0, 0)));

        let at_nine = Schedule::selected_day(date(2026, 1, 10), ScheduleType::SpecificHour { hour: 9, minute: 0 });
        assert_eq!(next_due_at(&at_nine, &now, None), Some(at(2026, 1, 10, 9, 0)));
    }

    #[test]
    fn fire_time_skipped_by_dst_moves_forward() {
        use chrono_tz::Europe::Berlin;

        // Clocks jump from 02:00 to 03:00 on 2026-03-29.
        let schedule = Schedule::all_the_time(ScheduleType::SpecificHour { hour: 2, minute: 30 });
        let local = |h, m| Berlin.with_ymd_and_hms(2026, 3, 29, h, m, 0).unwrap();

        assert!(!is_due(&schedule, &local(3, 29), None));
        assert!(is_due(&schedule, &local(3, 30), None));
        assert_eq!(next_due_at(&schedule, &local(0, 0), None), Some(local(3, 30)));
        assert_eq!(local(3, 30).with_timezone(&Utc), at(2026, 3, 29, 1, 30));

        // The next day has a real 02:30 again.
        let next = next_due_at(&schedule, &local(4, 0), Some(local(3, 30).with_timezone(&Utc)));
        assert_eq!(next, Some(Berlin.with_ymd_and_hms(2026, 3, 30, 2, 30, 0).unwrap()));
    }

    #[test]
    fn selected_day_in_the_past_has_no_next_due() {
        let schedule = Schedule::selected_day(date(2026, 1, 10), hourly());
        assert_eq!(next_due_at(&schedule, &at(2026, 1, 11, 0, 0), None), None);
    }

    #[test]
    fn disabled_schedule_is_inert() {
        let mut schedule = Schedule::all_the_time(hourly());
        schedule.enabled = false;
        let now = at(2026, 1, 5, 12, 0);
        assert!(!is_due(&schedule, &now, None));
        assert_eq!(next_due_at(&schedule, &now, None), None);
    }

    #[test]
    fn next_due_is_now_when_due() {
        let schedule = Schedule::all_the_time(hourly());
        let now = at(2026, 1, 5, 12, 0);
        assert_eq!(next_due_at(&schedule, &now, None), Some(now));
    }

    #[test]
    fn next_due_periodic_counts_from_last_check() {
        let schedule = Schedule::all_the_time(hourly());
        let now = at(2026, 1, 5, 12, 0);
        let next = next_due_at(&schedule, &now, Some(now - Duration::minutes(10)));
        assert_eq!(next, Some(now + Duration::minutes(50)));
    }

    #[test]
    fn next_due_specific_hour_rolls_to_tomorrow() {
        let schedule = Schedule::all_the_time(ScheduleType::SpecificHour { hour: 9, minute: 30 });
        let now = at(2026, 1, 5, 10, 0);
        let next = next_due_at(&schedule, &now, Some(at(2026, 1, 5, 9, 30)));
        assert_eq!(next, Some(at(2026, 1, 6, 9, 30)));

        let early = at(2026, 1, 5, 7, 0);
        assert_eq!(next_due_at(&schedule, &early, None), Some(at(2026, 1, 5, 9, 30)));
    }

    #[test]
    fn next_due_skips_to_future_date_range() {
        let schedule = Schedule::date_range(date(2026, 1, 10), date(2026, 1, 12), hourly());
        let now = at(2026, 1, 1, 12, 0);
        assert_eq!(next_due_at(&schedule, &now, None), Some(at(2026, 1, 10, 0, 0)));
    }

    #[test]
    fn next_due_leaves_range_when_last_slot_is_used() {
        let schedule = Schedule::date_range(date(2026, 1, 10), date(2026, 1, 10), hourly());
        let now = at(2026, 1, 10, 23, 30);
        let next = next_due_at(&schedule, &now, Some(at(2026, 1, 10, 23, 0)));
        assert_eq!(next, None);
    }

    #[test]
    fn next_due_every_weeks_finds_even_monday() {
        let schedule = Schedule::every_weeks(
            DayMask::MONDAY,
            WeekParity::Even,
            ScheduleType::SpecificHour { hour: 8, minute: 0 },
        );
        // 2026-01-12 is a Monday in ISO week 3.
        let now = at(2026, 1, 12, 12, 0);
        let next = next_due_at(&schedule, &now, None).unwrap();
        assert_eq!(next, at(2026, 1, 19, 8, 0));
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!(next.hour(), 8);
    }

    #[test]
    fn next_due_is_never_in_the_past() {
        let schedules = [
            Schedule::all_the_time(hourly()),
            Schedule::all_the_time(ScheduleType::SpecificHour { hour: 6, minute: 15 }),
            Schedule::every_weeks(DayMask::WEEKENDS, WeekParity::Odd, hourly()),
            Schedule::date_range(date(2026, 2, 1), date(2026, 2, 3), ScheduleType::LiveTracking { minutes: 0, seconds: 45 }),
        ];
        let now = at(2026, 1, 7, 18, 45);
        let last = Some(now - Duration::minutes(5));
        for schedule in &schedules {
            let next = next_due_at(schedule, &now, last).unwrap();
            assert!(next >= now, "{:?}", schedule);
            assert!(is_due(schedule, &next, last), "{:?} at {}", schedule, next);
        }
    }

    #[test]
    fn item_schedules_are_or_ed() {
        let now = at(2026, 1, 5, 12, 0);
        let never = Schedule::every_weeks(DayMask::NONE, WeekParity::Both, hourly());
        let always = Schedule::all_the_time(hourly());
        let item = item_with(vec![never.clone(), always], Some(now - Duration::hours(2)));
        assert!(item_is_due(&item, &now));

        let item = item_with(vec![never], None);
        assert!(!item_is_due(&item, &now));
        assert_eq!(next_item_due_at(&item, &now), None);
    }

    #[test]
    fn next_item_due_takes_the_earliest_schedule() {
        let now = at(2026, 1, 5, 12, 0);
        let item = item_with(
            vec![
                Schedule::all_the_time(ScheduleType::Periodic { interval_minutes: 120 }),
                Schedule::all_the_time(ScheduleType::Periodic { interval_minutes: 30 }),
            ],
            Some(now - Duration::minutes(20)),
        );
        assert_eq!(next_item_due_at(&item, &now), Some(now + Duration::minutes(10)));
    }

    #[test]
    fn disabled_item_is_never_due() {
        let now = at(2026, 1, 5, 12, 0);
        let mut item = item_with(Schedule::default_list(), None);
        item.enabled = false;
        assert!(!item_is_due(&item, &now));
        assert_eq!(next_item_due_at(&item, &now), None);
    }
}
