//! Deadline labels for notification text, localized uk/en.

use chrono::{DateTime, Duration, Utc};

/// Plain date-time rendering in the conventional pattern for each language.
pub fn format_datetime(dt: DateTime<Utc>, language: &str) -> String {
    match language {
        "en" => dt.format("%m/%d/%Y %I:%M %p").to_string(),
        _ => dt.format("%d.%m.%Y %H:%M").to_string(),
    }
}

/// Deadline label with a tomorrow marker when the date falls on the calendar
/// day after `now`, and an overdue marker once it has passed.
pub fn deadline_label(dt: DateTime<Utc>, now: DateTime<Utc>, language: &str) -> String {
    let formatted = format_datetime(dt, language);

    if dt < now {
        let marker = match language {
            "en" => "Overdue",
            _ => "Прострочено",
        };
        return format!("{marker}: {formatted}");
    }

    if dt.date_naive() == (now + Duration::days(1)).date_naive() {
        let marker = match language {
            "en" => "Tomorrow",
            _ => "Завтра",
        };
        return format!("{marker}, {formatted}");
    }

    formatted
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn tomorrow_gets_the_marker_in_both_languages() {
        let tomorrow = Utc.with_ymd_and_hms(2026, 8, 11, 18, 30, 0).unwrap();
        assert_eq!(deadline_label(tomorrow, now(), "uk"), "Завтра, 11.08.2026 18:30");
        assert_eq!(deadline_label(tomorrow, now(), "en"), "Tomorrow, 08/11/2026 06:30 PM");
    }

    #[test]
    fn past_dates_get_the_overdue_marker() {
        let yesterday = Utc.with_ymd_and_hms(2026, 8, 9, 12, 0, 0).unwrap();
        assert_eq!(
            deadline_label(yesterday, now(), "uk"),
            "Прострочено: 09.08.2026 12:00"
        );
        assert_eq!(
            deadline_label(yesterday, now(), "en"),
            "Overdue: 08/09/2026 12:00 PM"
        );
    }

    #[test]
    fn distant_dates_are_rendered_plain() {
        let next_week = Utc.with_ymd_and_hms(2026, 8, 17, 10, 0, 0).unwrap();
        assert_eq!(deadline_label(next_week, now(), "uk"), "17.08.2026 10:00");
    }

    #[test]
    fn unknown_language_falls_back_to_ukrainian() {
        let dt = Utc.with_ymd_and_hms(2026, 8, 12, 8, 0, 0).unwrap();
        assert_eq!(format_datetime(dt, "de"), "12.08.2026 08:00");
    }
}
