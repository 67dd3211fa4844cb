use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

// NSE equity session (IST).
const PRE_OPEN_HOUR: u32 = 9;
const PRE_OPEN_MINUTE: u32 = 0;
const OPEN_HOUR: u32 = 9;
const OPEN_MINUTE: u32 = 15;
const CLOSE_HOUR: u32 = 15;
const CLOSE_MINUTE: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSession {
    PreOpen,
    Open,
    Closed,
}

/// IST wall-clock time for a UTC instant. IST has no DST, so a fixed shift is exact.
pub fn to_ist(dt: DateTime<Utc>) -> NaiveDateTime {
    dt.naive_utc() + chrono::Duration::seconds(i64::from(IST_OFFSET_SECS))
}

/// Wall-clock label for a live sample, e.g. `14:05:30`.
pub fn sample_label(now_utc: DateTime<Utc>) -> String {
    to_ist(now_utc).format("%H:%M:%S").to_string()
}

/// Label for a daily bar given its unix timestamp, e.g. `14-Oct`.
pub fn daily_label(unix_secs: i64) -> Option<String> {
    let dt = DateTime::<Utc>::from_timestamp(unix_secs, 0)?;
    Some(to_ist(dt).format("%d-%b").to_string())
}

/// Label for the i-th synthetic intraday sample: quarter hours from 9:00.
pub fn backfill_label(i: usize) -> String {
    format!("{}:{:02}", 9 + i / 4, (i % 4) * 15)
}

pub fn session_at(now_utc: DateTime<Utc>) -> MarketSession {
    let now_ist = to_ist(now_utc);
    let date = now_ist.date();
    if is_weekend(date) || configured_holidays().contains(&date) {
        return MarketSession::Closed;
    }

    let t = now_ist.time();
    let pre_open = hm(PRE_OPEN_HOUR, PRE_OPEN_MINUTE);
    let open = hm(OPEN_HOUR, OPEN_MINUTE);
    let close = hm(CLOSE_HOUR, CLOSE_MINUTE);

    if t >= open && t < close {
        MarketSession::Open
    } else if t >= pre_open && t < open {
        MarketSession::PreOpen
    } else {
        MarketSession::Closed
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn configured_holidays() -> HashSet<NaiveDate> {
    // Republic Day, Independence Day, Gandhi Jayanti and Christmas are fixed-date
    // exchange holidays. Extend via NSE_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
    let mut out = HashSet::new();
    for y in 2024..=2030 {
        for (m, d) in [(1, 26), (8, 15), (10, 2), (12, 25)] {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                out.insert(date);
            }
        }
    }

    if let Ok(s) = std::env::var("NSE_MARKET_HOLIDAYS") {
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Ok(d) = NaiveDate::parse_from_str(part, "%Y-%m-%d") {
                out.insert(d);
            }
        }
    }

    out
}
