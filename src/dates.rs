use chrono::{Datelike, Duration, NaiveDate};

/// Parses the date formats found in spreadsheet exports and stored records.
///
/// Accepts `YYYY-MM-DD` (with an optional `T...` time part), `YYYY/MM/DD`,
/// `M/D/YYYY` and `M/D/YY`. Anything after the first space is treated as a
/// time of day and dropped. Returns `None` for anything else.
pub fn parse_record_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.split_whitespace().next()?;
    let cleaned = cleaned.split('T').next()?;

    if let Ok(date) = NaiveDate::parse_from_str(cleaned, "%Y-%m-%d") {
        return Some(date);
    }

    let parts: Vec<&str> = cleaned.split('/').collect();
    if parts.len() != 3 {
        return None;
    }

    let (year, month, day) = if parts[0].len() == 4 {
        (parts[0], parts[1], parts[2])
    } else {
        (parts[2], parts[0], parts[1])
    };

    let mut year: i32 = year.parse().ok()?;
    if parts[2].len() == 2 && parts[0].len() != 4 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month.parse().ok()?, day.parse().ok()?)
}

/// Moves `date` back by `months` calendar months.
///
/// The year rolls back when the month drops below January. A day that does
/// not exist in the target month spills forward into the following month,
/// so 31 March minus one month is 2 March in a leap year. Returns `None`
/// when the result falls outside the representable calendar.
pub fn months_before(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    let total = i64::from(date.year()) * 12 + i64::from(date.month0()) - i64::from(months);
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;

    NaiveDate::from_ymd_opt(year, month, 1)?
        .checked_add_signed(Duration::days(i64::from(date.day()) - 1))
}

/// The Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}
