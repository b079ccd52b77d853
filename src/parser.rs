use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;

/// Timestamp as served by the API: RFC 3339, or a bare date at midnight UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&ts));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(start_of_day)
}

/// Due date typed into the task form.
///
/// Accepts `YYYY-MM-DD`, `DD.MM.YYYY`, `today`, `tomorrow` and `+Nd`.
pub fn parse_due_date(input: &str, today: NaiveDate) -> Option<DateTime<Utc>> {
    let relative_re = Regex::new(r"^\+(\d{1,3})\s*d$").unwrap();
    let dotted_re = Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{4})$").unwrap();

    let input = input.trim().to_lowercase();

    let date = match input.as_str() {
        "" => return None,
        "today" => today,
        "tomorrow" => today + Duration::days(1),
        _ => {
            if let Some(caps) = relative_re.captures(&input) {
                let days: i64 = caps[1].parse().ok()?;
                today + Duration::days(days)
            } else if let Some(caps) = dotted_re.captures(&input) {
                let day: u32 = caps[1].parse().ok()?;
                let month: u32 = caps[2].parse().ok()?;
                let year: i32 = caps[3].parse().ok()?;
                NaiveDate::from_ymd_opt(year, month, day)?
            } else {
                NaiveDate::parse_from_str(&input, "%Y-%m-%d").ok()?
            }
        }
    };

    Some(start_of_day(date))
}

pub fn format_due_date(due: &DateTime<Utc>) -> String {
    due.format("%Y-%m-%d").to_string()
}

pub fn word_count(text: &str) -> usize {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }
    Regex::new(r"\s+").unwrap().split(text).count()
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}
