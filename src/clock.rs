//! Market-local clock
//!
//! Event windows and P&L dates are expressed in exchange wall-clock time
//! (US equities and options: America/New_York).

use chrono::{NaiveDate, NaiveDateTime, Utc};
use chrono_tz::America::New_York;
use chrono_tz::Tz;

/// Exchange time zone
pub const MARKET_TZ: Tz = New_York;

/// Current market-local wall-clock time
pub fn market_now() -> NaiveDateTime {
    Utc::now().with_timezone(&MARKET_TZ).naive_local()
}

/// Current market-local date
pub fn market_today() -> NaiveDate {
    market_now().date()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_market_time_is_behind_utc() {
        // 14:00 UTC in October (EDT) is 10:00 in New York
        let utc = Utc.with_ymd_and_hms(2026, 10, 19, 14, 0, 0).unwrap();
        let local = utc.with_timezone(&MARKET_TZ).naive_local();
        assert_eq!(local.format("%H:%M").to_string(), "10:00");
    }

    #[test]
    fn test_market_today_matches_now() {
        let now = market_now();
        let today = market_today();
        // Guard against a midnight rollover between the two calls
        assert!(today == now.date() || today == now.date().succ_opt().unwrap());
    }
}
