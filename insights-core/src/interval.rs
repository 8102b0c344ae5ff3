//! Calendar arithmetic for insight windows.
//!
//! Two week conventions meet here. Point counting follows the caller's
//! locale (US weeks start on Sunday, most of Europe on Monday). Bucket
//! boundaries follow PostgreSQL `DATE_TRUNC`, which always starts weeks on
//! Monday, so every value compared against generated SQL uses [`truncate`].

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc, Weekday};

use crate::error::InsightsError;
use crate::filter::Interval;

// ------------------------------------------------------------------ //
//  Locale                                                             //
// ------------------------------------------------------------------ //

/// Territories whose week starts on Sunday (CLDR `weekData`).
const SUNDAY_FIRST: &[&str] = &[
    "AG", "AS", "BD", "BR", "BS", "BT", "BW", "BZ", "CA", "CO", "DM", "DO", "ET", "GT", "GU",
    "HK", "HN", "ID", "IL", "IN", "JM", "JP", "KE", "KH", "KR", "LA", "MH", "MM", "MO", "MT",
    "MX", "MZ", "NI", "NP", "PA", "PE", "PH", "PK", "PR", "PT", "PY", "SA", "SG", "SV", "TH",
    "TT", "TW", "UM", "US", "VE", "VI", "WS", "YE", "ZA", "ZW",
];

/// Territories whose week starts on Saturday.
const SATURDAY_FIRST: &[&str] = &[
    "AE", "AF", "BH", "DJ", "DZ", "EG", "IQ", "IR", "JO", "KW", "LY", "OM", "QA", "SD", "SY",
];

/// Territory assumed for a bare language tag.
fn default_territory(language: &str) -> Option<&'static str> {
    Some(match language {
        "en" => "US",
        "ja" => "JP",
        "ko" => "KR",
        "he" => "IL",
        "hi" => "IN",
        "th" => "TH",
        "pt" => "BR",
        "ar" => "EG",
        "fa" => "IR",
        _ => return None,
    })
}

/// First day of the week for an IETF language tag such as `en-US`,
/// `de`, `pt_BR` or `zh-Hant-TW`.
pub fn week_start_for_locale(locale: &str) -> Result<Weekday, InsightsError> {
    let invalid = || InsightsError::InvalidLocale(locale.to_string());
    let mut subtags = locale.trim().split(['-', '_']);

    let language = subtags.next().unwrap_or_default().to_ascii_lowercase();
    if !(2..=3).contains(&language.len()) || !language.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }

    let mut region = None;
    for subtag in subtags {
        if subtag.is_empty() {
            return Err(invalid());
        }
        let is_region = (subtag.len() == 2 && subtag.chars().all(|c| c.is_ascii_alphabetic()))
            || (subtag.len() == 3 && subtag.chars().all(|c| c.is_ascii_digit()));
        if is_region {
            region = Some(subtag.to_ascii_uppercase());
            break;
        }
    }

    let region = region.or_else(|| default_territory(&language).map(str::to_string));
    Ok(match region.as_deref() {
        Some(r) if SUNDAY_FIRST.contains(&r) => Weekday::Sun,
        Some(r) if SATURDAY_FIRST.contains(&r) => Weekday::Sat,
        _ => Weekday::Mon,
    })
}

// ------------------------------------------------------------------ //
//  Calendar helpers                                                   //
// ------------------------------------------------------------------ //

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn start_of_week(date: NaiveDate, week_start: Weekday) -> NaiveDate {
    let back = (7 + date.weekday().num_days_from_monday() - week_start.num_days_from_monday()) % 7;
    date - Duration::days(i64::from(back))
}

/// Same result as PostgreSQL `DATE_TRUNC(interval, ts)` in a UTC session.
pub fn truncate(ts: DateTime<Utc>, interval: Interval) -> DateTime<Utc> {
    let date = ts.date_naive();
    let truncated = match interval {
        Interval::Day => date,
        Interval::Week => start_of_week(date, Weekday::Mon),
        Interval::Month => date - Duration::days(i64::from(date.day0())),
        Interval::Quarter => {
            let first_month = date.month0() / 3 * 3 + 1;
            NaiveDate::from_ymd_opt(date.year(), first_month, 1).unwrap_or(date)
        }
    };
    start_of_day(truncated)
}

/// `ts` moved back by `count` intervals.
pub fn shift_back(ts: DateTime<Utc>, interval: Interval, count: u32) -> DateTime<Utc> {
    match interval {
        Interval::Day => ts - Duration::days(i64::from(count)),
        Interval::Week => ts - Duration::weeks(i64::from(count)),
        Interval::Month => ts
            .checked_sub_months(Months::new(count))
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
        Interval::Quarter => ts
            .checked_sub_months(Months::new(count.saturating_mul(3)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
    }
}

/// Number of interval boundaries crossed going from `from` to `to`.
///
/// Weeks are delimited by `week_start`; days, months and quarters by the
/// calendar. Negative when `to` precedes `from`.
pub fn calendar_diff(
    interval: Interval,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    week_start: Weekday,
) -> i64 {
    let (from, to) = (from.date_naive(), to.date_naive());
    match interval {
        Interval::Day => (to - from).num_days(),
        Interval::Week => {
            (start_of_week(to, week_start) - start_of_week(from, week_start)).num_days() / 7
        }
        Interval::Month => {
            let months = |d: NaiveDate| i64::from(d.year()) * 12 + i64::from(d.month0());
            months(to) - months(from)
        }
        Interval::Quarter => {
            let quarters = |d: NaiveDate| i64::from(d.year()) * 4 + i64::from(d.month0() / 3);
            quarters(to) - quarters(from)
        }
    }
}

// ------------------------------------------------------------------ //
//  Window bounds                                                      //
// ------------------------------------------------------------------ //

/// How many buckets the requested window spans.
pub fn points_per_interval(
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
    interval: Interval,
    week_start: Weekday,
    now: DateTime<Utc>,
) -> u32 {
    match date_from {
        None => interval.default_points(),
        Some(from) => {
            let diff = calendar_diff(interval, from, date_to.unwrap_or(now), week_start);
            u32::try_from(diff.max(0)).unwrap_or(u32::MAX)
        }
    }
}

/// Reference instant for windows computed relative to "the end".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// The database clock, `NOW()`.
    Now,
    At(DateTime<Utc>),
}

impl Anchor {
    pub fn from_date_to(date_to: Option<DateTime<Utc>>) -> Self {
        date_to.map_or(Anchor::Now, Anchor::At)
    }
}

/// Lower date bound of the base scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowerBound {
    /// `DATE_TRUNC(interval, anchor) - offset intervals`
    Truncated { anchor: Anchor, offset: u32 },
    /// The caller's start date, verbatim.
    Exact(DateTime<Utc>),
}

pub fn lower_bound(
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
    points: u32,
    interval: Interval,
    now: DateTime<Utc>,
) -> LowerBound {
    let offset = points.saturating_sub(1);
    match (date_from, date_to) {
        (None, None) => LowerBound::Truncated {
            anchor: Anchor::Now,
            offset,
        },
        (None, Some(to)) => LowerBound::Truncated {
            anchor: Anchor::At(to),
            offset,
        },
        (Some(from), None) => {
            let window_start = shift_back(truncate(now, interval), interval, offset);
            if from >= window_start {
                LowerBound::Truncated {
                    anchor: Anchor::Now,
                    offset,
                }
            } else {
                LowerBound::Exact(from)
            }
        }
        // Explicit ranges are honoured exactly, including a start that sits
        // mid-bucket: the partial first bucket is kept.
        (Some(from), Some(_)) => LowerBound::Exact(from),
    }
}

/// Boundary of a trend window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEdge {
    /// The anchor itself.
    Anchor,
    /// `DATE_TRUNC(interval, anchor)` moved back `back` intervals.
    Truncated { back: u32 },
}

/// One trailing window used to compute a relative trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendWindow {
    pub anchor: Anchor,
    pub start: WindowEdge,
    pub end: WindowEdge,
    pub end_inclusive: bool,
}

/// The last interval (up to the anchor) and the full interval before it.
pub fn trend_windows(date_to: Option<DateTime<Utc>>) -> (TrendWindow, TrendWindow) {
    let anchor = Anchor::from_date_to(date_to);
    let last = TrendWindow {
        anchor,
        start: WindowEdge::Truncated { back: 0 },
        end: WindowEdge::Anchor,
        end_inclusive: true,
    };
    let before = TrendWindow {
        anchor,
        start: WindowEdge::Truncated { back: 1 },
        end: WindowEdge::Truncated { back: 0 },
        end_inclusive: false,
    };
    (last, before)
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
