// Trading Day Resolver
// Monday-Friday week, no holiday calendar

use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};

/// Most recent trading day strictly before `today`.
///
/// Sunday goes back to Friday (2 days), Monday goes back to Friday (3 days),
/// every other day goes back one calendar day. Saturday therefore resolves to
/// Friday as well.
pub fn last_trading_day(today: NaiveDate) -> NaiveDate {
    let offset = match today.weekday() {
        Weekday::Sun => 2,
        Weekday::Mon => 3,
        _ => 1,
    };
    today - Duration::days(offset)
}

/// `last_trading_day` formatted as `YYYY-MM-DD`
pub fn last_trading_day_string(today: NaiveDate) -> String {
    last_trading_day(today).format("%Y-%m-%d").to_string()
}

/// Reference date for a run starting now, using the local calendar date
pub fn previous_trading_day_from_now() -> String {
    last_trading_day_string(Local::now().date_naive())
}
