/// C4 Quiet-Hours Evaluator.
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::models::{NotificationCategory, NotificationPriority, QuietHoursConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuietHoursCheck {
    pub is_quiet: bool,
    pub next_available_at: Option<DateTime<Utc>>,
}

/// `checkQuietHours(userId, now)`. Callers pass the already-loaded
/// `QuietHoursConfig` (C4 itself has no storage dependency — loading
/// preferences is the caller's job, typically the C9/C11 delivery path).
pub fn check_quiet_hours(config: &QuietHoursConfig, now: DateTime<Utc>) -> QuietHoursCheck {
    if !config.enabled {
        return QuietHoursCheck {
            is_quiet: false,
            next_available_at: None,
        };
    }

    let tz: Tz = config.timezone.parse().unwrap_or(chrono_tz::UTC);
    let local_now = now.with_timezone(&tz);
    let current_minutes = local_now.time().num_seconds_from_midnight_minutes();

    let start = parse_minutes(&config.start);
    let end = parse_minutes(&config.end);

    let inside = if start > end {
        current_minutes >= start || current_minutes < end
    } else {
        current_minutes >= start && current_minutes < end
    };

    if !inside {
        return QuietHoursCheck {
            is_quiet: false,
            next_available_at: None,
        };
    }

    let end_time = NaiveTime::from_hms_opt((end / 60) as u32, (end % 60) as u32, 0)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(8, 0, 0).unwrap());

    let today_end = local_now.date_naive().and_time(end_time);
    let next_local = if start > end && current_minutes >= start {
        // Wraps past midnight: the boundary is tomorrow's local date.
        tz.from_local_datetime(&(today_end + ChronoDuration::days(1)))
            .single()
    } else {
        tz.from_local_datetime(&today_end).single()
    };

    let next_available_at = next_local
        .map(|dt| dt.with_timezone(&Utc))
        .or(Some(now + ChronoDuration::hours(1)));

    QuietHoursCheck {
        is_quiet: true,
        next_available_at,
    }
}

fn parse_minutes(hhmm: &str) -> i64 {
    let mut parts = hhmm.splitn(2, ':');
    let h: i64 = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
    let m: i64 = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
    h * 60 + m
}

trait MinutesSinceMidnight {
    fn num_seconds_from_midnight_minutes(&self) -> i64;
}

impl MinutesSinceMidnight for chrono::NaiveTime {
    fn num_seconds_from_midnight_minutes(&self) -> i64 {
        use chrono::Timelike;
        (self.hour() as i64) * 60 + (self.minute() as i64)
    }
}

/// `isUrgent(category, priority, urgent?)`.
pub fn is_urgent(
    category: NotificationCategory,
    priority: NotificationPriority,
    urgent: Option<bool>,
) -> bool {
    if urgent.unwrap_or(false) {
        return true;
    }
    if matches!(
        priority,
        NotificationPriority::High | NotificationPriority::Critical
    ) {
        return true;
    }
    matches!(
        category,
        NotificationCategory::Mention | NotificationCategory::Message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(start: &str, end: &str) -> QuietHoursConfig {
        QuietHoursConfig {
            enabled: true,
            start: start.to_string(),
            end: end.to_string(),
            timezone: "UTC".to_string(),
        }
    }

    #[test]
    fn disabled_is_never_quiet() {
        let mut cfg = config("22:00", "08:00");
        cfg.enabled = false;
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 23, 0, 0).unwrap();
        assert!(!check_quiet_hours(&cfg, now).is_quiet);
    }

    #[test]
    fn wrapping_window_is_quiet_after_midnight() {
        let cfg = config("22:00", "08:00");
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 23, 30, 0).unwrap();
        let result = check_quiet_hours(&cfg, now);
        assert!(result.is_quiet);
        let next = result.next_available_at.unwrap();
        assert_eq!(next.format("%H:%M").to_string(), "08:00");
    }

    #[test]
    fn wrapping_window_outside_range_is_not_quiet() {
        let cfg = config("22:00", "08:00");
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert!(!check_quiet_hours(&cfg, now).is_quiet);
    }

    #[test]
    fn non_wrapping_window_respects_bounds() {
        let cfg = config("09:00", "17:00");
        let inside = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2026, 1, 1, 18, 0, 0).unwrap();
        assert!(check_quiet_hours(&cfg, inside).is_quiet);
        assert!(!check_quiet_hours(&cfg, outside).is_quiet);
    }

    #[test]
    fn urgent_flag_overrides_quiet_hours() {
        assert!(is_urgent(
            NotificationCategory::System,
            NotificationPriority::Low,
            Some(true)
        ));
    }

    #[test]
    fn high_priority_is_urgent() {
        assert!(is_urgent(
            NotificationCategory::Social,
            NotificationPriority::High,
            None
        ));
    }

    #[test]
    fn mention_category_is_urgent() {
        assert!(is_urgent(
            NotificationCategory::Mention,
            NotificationPriority::Low,
            None
        ));
    }

    #[test]
    fn normal_social_is_not_urgent() {
        assert!(!is_urgent(
            NotificationCategory::Social,
            NotificationPriority::Normal,
            None
        ));
    }
}
