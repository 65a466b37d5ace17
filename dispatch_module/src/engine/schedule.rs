use chrono::{DateTime, Months, Utc};

use super::types::{DispatchMode, EngineError, RecurrenceInterval, ScheduleRequest};

/// Reject a schedule request before anything is persisted.
pub(crate) fn validate_schedule(
    request: &ScheduleRequest,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    match request.mode {
        DispatchMode::Immediate => Ok(()),
        DispatchMode::Scheduled | DispatchMode::Recurring => {
            let schedule_time = request.schedule_time.ok_or_else(|| {
                EngineError::InvalidSchedule("schedule_time is required".to_string())
            })?;
            if schedule_time <= now {
                return Err(EngineError::InvalidSchedule(format!(
                    "schedule_time {} is not in the future",
                    schedule_time.to_rfc3339()
                )));
            }
            if request.mode == DispatchMode::Recurring && request.recurrence_interval.is_none() {
                return Err(EngineError::InvalidSchedule(
                    "recurrence_interval is required for recurring campaigns".to_string(),
                ));
            }
            Ok(())
        }
    }
}

/// Advance a recurring campaign by one interval. Monthly addition clamps the
/// day-of-month to the last valid day of the target month (Jan 31 -> Feb 28).
pub(crate) fn next_run_after(
    interval: RecurrenceInterval,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, EngineError> {
    match interval {
        RecurrenceInterval::Daily => Ok(after + chrono::Duration::days(1)),
        RecurrenceInterval::Weekly => Ok(after + chrono::Duration::days(7)),
        RecurrenceInterval::Monthly => after.checked_add_months(Months::new(1)).ok_or_else(|| {
            EngineError::InvalidSchedule(format!(
                "cannot advance {} by one month",
                after.to_rfc3339()
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 9, 30, 0).unwrap()
    }

    #[test]
    fn monthly_advance_clamps_to_end_of_february() {
        let next = next_run_after(RecurrenceInterval::Monthly, utc(2025, 1, 31)).expect("advance");
        assert_eq!(next, utc(2025, 2, 28));
    }

    #[test]
    fn monthly_advance_uses_leap_day_in_leap_years() {
        let next = next_run_after(RecurrenceInterval::Monthly, utc(2024, 1, 31)).expect("advance");
        assert_eq!(next, utc(2024, 2, 29));
    }

    #[test]
    fn monthly_advance_keeps_day_when_valid() {
        let next = next_run_after(RecurrenceInterval::Monthly, utc(2025, 3, 15)).expect("advance");
        assert_eq!(next, utc(2025, 4, 15));
    }

    #[test]
    fn daily_and_weekly_advance_are_fixed_offsets() {
        let from = utc(2025, 6, 1);
        assert_eq!(
            next_run_after(RecurrenceInterval::Daily, from).expect("daily"),
            utc(2025, 6, 2)
        );
        assert_eq!(
            next_run_after(RecurrenceInterval::Weekly, from).expect("weekly"),
            utc(2025, 6, 8)
        );
    }

    #[test]
    fn validate_rejects_past_schedule_time() {
        let now = utc(2025, 6, 1);
        let request = ScheduleRequest {
            mode: DispatchMode::Scheduled,
            schedule_time: Some(utc(2025, 5, 31)),
            recurrence_interval: None,
            recipient_ids: vec![1],
        };
        assert!(matches!(
            validate_schedule(&request, now),
            Err(EngineError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn validate_rejects_recurring_without_interval() {
        let now = utc(2025, 6, 1);
        let request = ScheduleRequest {
            mode: DispatchMode::Recurring,
            schedule_time: Some(utc(2025, 6, 2)),
            recurrence_interval: None,
            recipient_ids: vec![1],
        };
        assert!(matches!(
            validate_schedule(&request, now),
            Err(EngineError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn validate_accepts_future_recurring_schedule() {
        let now = utc(2025, 6, 1);
        let request = ScheduleRequest {
            mode: DispatchMode::Recurring,
            schedule_time: Some(utc(2025, 6, 2)),
            recurrence_interval: Some(RecurrenceInterval::Weekly),
            recipient_ids: vec![1],
        };
        assert!(validate_schedule(&request, now).is_ok());
    }
}
