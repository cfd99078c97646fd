use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::{ClassInstance, ClassSchedule, ClassStatus, MergedClass};

pub const DEFAULT_CAPACITY: i32 = 15;
pub const DEFAULT_COACH: &str = "מאמן";
pub const DEFAULT_DURATION_MINUTES: i64 = 60;
const FILLING_THRESHOLD: f64 = 0.70;

/// Template day numbering: 1 = Sunday .. 7 = Saturday.
pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32 + 1
}

/// Inclusive local-time window covering the whole day.
pub fn day_window(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(NaiveTime::MIN);
    let end = date.and_hms_opt(23, 59, 59).unwrap_or(start);
    (start, end)
}

pub fn occupancy_status(registered: i64, capacity: i32) -> ClassStatus {
    if registered >= i64::from(capacity) {
        ClassStatus::Full
    } else if capacity > 0 && registered as f64 / f64::from(capacity) > FILLING_THRESHOLD {
        ClassStatus::Filling
    } else {
        ClassStatus::Open
    }
}

fn time_label(starts_at: NaiveDateTime, duration_minutes: Option<i32>) -> String {
    let minutes = duration_minutes
        .map(i64::from)
        .filter(|minutes| *minutes > 0)
        .unwrap_or(DEFAULT_DURATION_MINUTES);
    let ends_at = starts_at + Duration::minutes(minutes);
    format!("{} - {}", starts_at.format("%H:%M"), ends_at.format("%H:%M"))
}

fn from_template(
    date: NaiveDate,
    schedule: &ClassSchedule,
    instance: Option<&ClassInstance>,
) -> MergedClass {
    let projected = date.and_time(schedule.start_time);

    match instance {
        Some(instance) => {
            let registered = instance.bookings.map(|b| b.count).unwrap_or(0);
            let capacity = instance
                .max_participants
                .or(schedule.max_participants)
                .unwrap_or(DEFAULT_CAPACITY);
            let coach_name = instance
                .coach_name
                .clone()
                .or_else(|| schedule.coach_name.clone())
                .unwrap_or_else(|| DEFAULT_COACH.to_string());
            let name = instance
                .name_hebrew
                .clone()
                .or_else(|| instance.name.clone())
                .unwrap_or_else(|| schedule.name.clone());

            MergedClass {
                id: instance.id.to_string(),
                schedule_id: Some(schedule.id),
                name,
                name_hebrew: instance.name_hebrew.clone(),
                time_label: time_label(instance.class_date, schedule.duration_minutes),
                date,
                starts_at: instance.class_date,
                coach_name,
                registered,
                capacity,
                status: occupancy_status(registered, capacity),
                is_instance: true,
            }
        }
        None => {
            let capacity = schedule.max_participants.unwrap_or(DEFAULT_CAPACITY);
            MergedClass {
                id: format!("virtual_{}", schedule.id),
                schedule_id: Some(schedule.id),
                name: schedule.name.clone(),
                name_hebrew: Some(schedule.name.clone()),
                time_label: time_label(projected, schedule.duration_minutes),
                date,
                starts_at: projected,
                coach_name: schedule
                    .coach_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_COACH.to_string()),
                registered: 0,
                capacity,
                status: occupancy_status(0, capacity),
                is_instance: false,
            }
        }
    }
}

/// Builds the day view for `date`: every active template for that weekday,
/// overlaid with its class row when one exists. Class rows that no active
/// template for the day claims are not listed. Sorted by start time.
///
/// `registered` is whatever booking count the store joined onto the class.
/// The Postgres store counts only confirmed, completed, no-show and late
/// bookings, so cancelled and waitlisted seats do not fill a class.
pub fn materialize(
    date: NaiveDate,
    schedules: &[ClassSchedule],
    instances: &[ClassInstance],
) -> Vec<MergedClass> {
    let weekday = day_of_week(date);
    let (window_start, window_end) = day_window(date);
    let todays_instances: Vec<&ClassInstance> = instances
        .iter()
        .filter(|instance| instance.class_date >= window_start && instance.class_date <= window_end)
        .collect();

    let todays_schedules: Vec<&ClassSchedule> = schedules
        .iter()
        .filter(|schedule| schedule.is_active && schedule.day_of_week == weekday)
        .collect();

    let mut merged: Vec<MergedClass> = todays_schedules
        .into_iter()
        .map(|schedule| {
            let instance = todays_instances
                .iter()
                .copied()
                .find(|instance| instance.schedule_id == Some(schedule.id));
            from_template(date, schedule, instance)
        })
        .collect();

    merged.sort_by_key(|class| class.starts_at);
    merged
}
