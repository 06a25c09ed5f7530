/// Playtime gate for real-name verified minors.
///
/// Minors may only play between 20:00 and 21:00 on Fridays, Saturdays,
/// Sundays and statutory holidays. The gate reports whether the player is an
/// adult and, for a minor inside the window, how many seconds remain.
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike, Weekday};

use crate::account::types::MinorGate;

const WINDOW_OPEN_HOUR: u32 = 20;
const WINDOW_CLOSE_HOUR: u32 = 21;
const ADULT_AGE: i64 = 18;

/// Evaluate the gate for an account.
///
/// `verified` is whether the account passed real-name verification; the
/// unverified are not gated. `card_id` is an 18-character national id whose
/// digits 7..15 encode the birth date as yyyymmdd. `is_holiday` answers
/// whether a given date is a statutory holiday.
pub fn parse_card_id<F>(verified: bool, card_id: &str, now: DateTime<Local>, is_holiday: F) -> MinorGate
where
    F: Fn(NaiveDate) -> bool,
{
    if !verified {
        return MinorGate { adult: 0, play_time: 0 };
    }
    let birth = match birth_ymd(card_id) {
        Some(ymd) => ymd,
        None => return MinorGate { adult: 0, play_time: 0 },
    };
    let today = (now.year() as i64) * 10000 + (now.month() as i64) * 100 + now.day() as i64;
    // Integer yyyymmdd subtraction gives full years, borrowing handled by the
    // divide.
    let age = (today - birth) / 10000;
    if age > ADULT_AGE {
        return MinorGate { adult: 1, play_time: 0 };
    }

    let date = now.date_naive();
    let playable_day = matches!(
        now.weekday(),
        Weekday::Fri | Weekday::Sat | Weekday::Sun
    ) || is_holiday(date);
    if !playable_day || now.hour() != WINDOW_OPEN_HOUR {
        return MinorGate { adult: 0, play_time: 0 };
    }

    let close = Local
        .with_ymd_and_hms(now.year(), now.month(), now.day(), WINDOW_CLOSE_HOUR, 0, 0)
        .single();
    let remaining = match close {
        Some(close) => (close - now).num_seconds().max(0),
        None => 0,
    };
    MinorGate {
        adult: 0,
        play_time: remaining,
    }
}

/// Birth date as yyyymmdd from an 18-character card id, None when malformed.
fn birth_ymd(card_id: &str) -> Option<i64> {
    if card_id.len() != 18 {
        return None;
    }
    card_id.get(6..14)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_with_birth(ymd: &str) -> String {
        format!("110101{ymd}0012")
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).single().unwrap()
    }

    #[test]
    fn unverified_is_not_gated() {
        let gate = parse_card_id(false, "", at(2026, 8, 22, 20, 30), |_| false);
        assert_eq!(gate, MinorGate { adult: 0, play_time: 0 });
    }

    #[test]
    fn adult_passes() {
        // 2026-08-22 minus 1990-05-01 is well past 18.
        let gate = parse_card_id(true, &card_with_birth("19900501"), at(2026, 8, 22, 20, 30), |_| false);
        assert_eq!(gate, MinorGate { adult: 1, play_time: 0 });
    }

    #[test]
    fn minor_in_saturday_window_gets_remaining_seconds() {
        // 2026-08-22 is a Saturday; a 16-year-old at 20:30 has 30 minutes.
        let gate = parse_card_id(true, &card_with_birth("20100101"), at(2026, 8, 22, 20, 30), |_| false);
        assert_eq!(gate.adult, 0);
        assert_eq!(gate.play_time, 30 * 60);
    }

    #[test]
    fn minor_outside_window_gets_zero() {
        // Tuesday 22:00 is outside both day and hour.
        let gate = parse_card_id(true, &card_with_birth("20100101"), at(2026, 8, 25, 22, 0), |_| false);
        assert_eq!(gate, MinorGate { adult: 0, play_time: 0 });
    }

    #[test]
    fn minor_weekday_window_closed_without_holiday() {
        // Tuesday at 20:30, not a holiday.
        let gate = parse_card_id(true, &card_with_birth("20100101"), at(2026, 8, 25, 20, 30), |_| false);
        assert_eq!(gate.play_time, 0);
    }

    #[test]
    fn holiday_opens_the_window() {
        let gate = parse_card_id(true, &card_with_birth("20100101"), at(2026, 8, 25, 20, 30), |_| true);
        assert_eq!(gate.play_time, 30 * 60);
    }

    #[test]
    fn malformed_card_id_is_not_gated() {
        let gate = parse_card_id(true, "short", at(2026, 8, 22, 20, 30), |_| false);
        assert_eq!(gate, MinorGate { adult: 0, play_time: 0 });
    }
}
