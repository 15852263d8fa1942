use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::US::Eastern;
use serde::Serialize;

const PREMARKET_OPEN: u32 = 4 * 60;
const REGULAR_OPEN: u32 = 9 * 60 + 30;
const REGULAR_CLOSE: u32 = 16 * 60;
const AFTERHOURS_CLOSE: u32 = 20 * 60;

/// US equity session by the Eastern clock. Exchange holidays are not modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarketSession {
    PreMarket,
    Open,
    AfterHours,
    Closed,
}

impl MarketSession {
    pub fn at(now: DateTime<Utc>) -> Self {
        let now = now.with_timezone(&Eastern);

        // Skip weekends
        if now.weekday() == Weekday::Sat || now.weekday() == Weekday::Sun {
            return MarketSession::Closed;
        }

        let time_minutes = now.hour() * 60 + now.minute();
        if (REGULAR_OPEN..REGULAR_CLOSE).contains(&time_minutes) {
            MarketSession::Open
        } else if (PREMARKET_OPEN..REGULAR_OPEN).contains(&time_minutes) {
            MarketSession::PreMarket
        } else if (REGULAR_CLOSE..AFTERHOURS_CLOSE).contains(&time_minutes) {
            MarketSession::AfterHours
        } else {
            MarketSession::Closed
        }
    }

    pub fn status_message(&self) -> &'static str {
        match self {
            MarketSession::Open => "Market is currently OPEN",
            MarketSession::Closed => "Market is currently CLOSED",
            MarketSession::PreMarket => "Market is currently PRE-MARKET",
            MarketSession::AfterHours => "Market is currently AFTER-HOURS",
        }
    }
}

/// Eastern wall-clock time, e.g. `09:31:05 AM ET`.
pub fn eastern_clock(now: DateTime<Utc>) -> String {
    format!("{} ET", now.with_timezone(&Eastern).format("%I:%M:%S %p"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // 2024-03-13 is a Wednesday; Eastern is UTC-4 (EDT) that day.
    fn wednesday_et(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 13, hour + 4, minute, 0).unwrap()
    }

    #[test]
    fn test_sessions_on_weekday() {
        assert_eq!(MarketSession::at(wednesday_et(3, 59)), MarketSession::Closed);
        assert_eq!(MarketSession::at(wednesday_et(4, 0)), MarketSession::PreMarket);
        assert_eq!(MarketSession::at(wednesday_et(9, 29)), MarketSession::PreMarket);
        assert_eq!(MarketSession::at(wednesday_et(9, 30)), MarketSession::Open);
        assert_eq!(MarketSession::at(wednesday_et(15, 59)), MarketSession::Open);
        assert_eq!(MarketSession::at(wednesday_et(16, 0)), MarketSession::AfterHours);
        assert_eq!(MarketSession::at(wednesday_et(19, 59)), MarketSession::AfterHours);
    }

    #[test]
    fn test_late_evening_is_closed() {
        // 20:30 ET is 00:30 UTC the next day
        let t = Utc.with_ymd_and_hms(2024, 3, 14, 0, 30, 0).unwrap();
        assert_eq!(MarketSession::at(t), MarketSession::Closed);
    }

    #[test]
    fn test_weekend_is_closed() {
        // Saturday 2024-03-16, 11:00 ET
        let t = Utc.with_ymd_and_hms(2024, 3, 16, 15, 0, 0).unwrap();
        assert_eq!(MarketSession::at(t), MarketSession::Closed);
        assert_eq!(MarketSession::at(t).status_message(), "Market is currently CLOSED");
    }

    #[test]
    fn test_winter_offset() {
        // January: Eastern is UTC-5, so 14:30 UTC is 09:30 ET
        let t = Utc.with_ymd_and_hms(2024, 1, 10, 14, 30, 0).unwrap();
        assert_eq!(MarketSession::at(t), MarketSession::Open);
        assert_eq!(eastern_clock(t), "09:30:00 AM ET");
    }

    #[test]
    fn test_eastern_clock_format() {
        assert_eq!(eastern_clock(wednesday_et(15, 5)), "03:05:00 PM ET");
    }
}
