use chrono::{Datelike, NaiveDate};

/// Day-first date format used by the sources, e.g. `02.08.2023`
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Parse a `DD.MM.YYYY` token. Returns `None` when parsing fails.
pub fn parse_date(token: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(token.trim(), DATE_FORMAT).ok()
}

/// Comparable calendar value of a `DD.MM.YYYY` token
pub fn calendar_day(token: &str) -> Option<i64> {
    parse_date(token).map(|date| i64::from(date.num_days_from_ce()))
}
