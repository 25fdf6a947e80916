//! Trading-hours status for a single exchange. Pure function of the clock.

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::{offset, time};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset, Weekday};

use crate::{UtcDateTime, ValidationError};

/// Where the local clock sits relative to the trading window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSession {
    Weekend,
    PreMarket,
    /// First trading hour.
    Opening,
    Morning,
    Midday,
    Afternoon,
    /// Final stretch before the close.
    Closing,
    AfterHours,
}

impl MarketSession {
    pub const fn is_regular(self) -> bool {
        matches!(
            self,
            Self::Opening | Self::Morning | Self::Midday | Self::Afternoon | Self::Closing
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStatus {
    pub is_open: bool,
    pub session: MarketSession,
    /// Exchange-local wall clock, RFC3339 with offset.
    pub local_time: String,
    pub next_open: UtcDateTime,
}

/// Fixed Monday-Friday window at a fixed UTC offset. Holidays and daylight
/// saving are not modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketCalendar {
    open: Time,
    close: Time,
    offset: UtcOffset,
}

impl Default for MarketCalendar {
    /// Toronto Stock Exchange regular session, 09:30-16:00 Eastern Standard Time.
    fn default() -> Self {
        Self {
            open: time!(9:30),
            close: time!(16:00),
            offset: offset!(-5),
        }
    }
}

impl MarketCalendar {
    pub fn new(open: Time, close: Time, offset: UtcOffset) -> Result<Self, ValidationError> {
        if open >= close {
            return Err(ValidationError::config(
                "market open must be earlier than market close",
            ));
        }
        Ok(Self {
            open,
            close,
            offset,
        })
    }

    pub fn status_now(&self) -> MarketStatus {
        self.status_at(UtcDateTime::now())
    }

    pub fn status_at(&self, at: UtcDateTime) -> MarketStatus {
        let local = at.into_inner().to_offset(self.offset);
        let session = self.session_at(local);

        MarketStatus {
            is_open: session.is_regular(),
            session,
            local_time: local
                .format(&Rfc3339)
                .unwrap_or_else(|_| local.to_string()),
            next_open: self.next_open_after(local),
        }
    }

    fn session_at(&self, local: OffsetDateTime) -> MarketSession {
        if is_weekend(local.weekday()) {
            return MarketSession::Weekend;
        }
        let now = local.time();
        if now < self.open {
            return MarketSession::PreMarket;
        }
        if now >= self.close {
            return MarketSession::AfterHours;
        }
        match now.hour() {
            hour if hour <= self.open.hour() => MarketSession::Opening,
            0..=11 => MarketSession::Morning,
            12..=13 => MarketSession::Midday,
            14 => MarketSession::Afternoon,
            _ => MarketSession::Closing,
        }
    }

    fn next_open_after(&self, local: OffsetDateTime) -> UtcDateTime {
        let mut date = local.date();
        if is_weekend(date.weekday()) || local.time() >= self.open {
            date = next_weekday(date);
        }
        while is_weekend(date.weekday()) {
            date = next_weekday(date);
        }
        let open = PrimitiveDateTime::new(date, self.open)
            .assume_offset(self.offset)
            .to_offset(UtcOffset::UTC);
        UtcDateTime::from_offset_datetime(open).unwrap_or_else(|_| UtcDateTime::now())
    }
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Saturday | Weekday::Sunday)
}

fn next_weekday(date: Date) -> Date {
    let mut next = date.next_day().unwrap_or(date);
    while is_weekend(next.weekday()) {
        next = next.next_day().unwrap_or(next);
        if next == date {
            break;
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rfc3339: &str) -> UtcDateTime {
        UtcDateTime::parse(rfc3339).expect("timestamp")
    }

    #[test]
    fn weekday_morning_is_open() {
        // Tuesday 10:15 local.
        let status = MarketCalendar::default().status_at(at("2024-06-04T15:15:00Z"));

        assert!(status.is_open);
        assert_eq!(status.session, MarketSession::Morning);
        assert_eq!(status.local_time, "2024-06-04T10:15:00-05:00");
        assert_eq!(status.next_open, at("2024-06-05T14:30:00Z"));
    }

    #[test]
    fn first_hour_and_close_are_regular_sessions() {
        let calendar = MarketCalendar::default();

        assert_eq!(calendar.status_at(at("2024-06-04T14:45:00Z")).session, MarketSession::Opening);
        assert_eq!(calendar.status_at(at("2024-06-04T17:30:00Z")).session, MarketSession::Midday);
        assert_eq!(calendar.status_at(at("2024-06-04T20:59:00Z")).session, MarketSession::Closing);
    }

    #[test]
    fn pre_market_opens_the_same_day() {
        let status = MarketCalendar::default().status_at(at("2024-06-04T12:00:00Z"));

        assert!(!status.is_open);
        assert_eq!(status.session, MarketSession::PreMarket);
        assert_eq!(status.next_open, at("2024-06-04T14:30:00Z"));
    }

    #[test]
    fn friday_evening_rolls_to_monday() {
        // Friday 17:00 local.
        let status = MarketCalendar::default().status_at(at("2024-06-07T22:00:00Z"));

        assert_eq!(status.session, MarketSession::AfterHours);
        assert_eq!(status.next_open, at("2024-06-10T14:30:00Z"));
    }

    #[test]
    fn weekend_is_closed() {
        let status = MarketCalendar::default().status_at(at("2024-06-08T16:00:00Z"));

        assert!(!status.is_open);
        assert_eq!(status.session, MarketSession::Weekend);
        assert_eq!(status.next_open, at("2024-06-10T14:30:00Z"));
    }

    #[test]
    fn rejects_inverted_window() {
        assert!(MarketCalendar::new(time!(16:00), time!(9:30), offset!(-5)).is_err());
    }
}
