//! Text codecs for the wire parameters: `[x,y,z]` vectors and ISO-8601 epochs.
//!
//! Everything rendered here parses back through the matching parser.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use nalgebra::Vector3;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// Signed decimal with optional fraction and an `e`/`E`/`d`/`D` exponent.
const NUMBER: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eEdD][-+]?\d+)?";

static VECTOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*\[\s*({n})\s*,\s*({n})\s*,\s*({n})\s*\]\s*$",
        n = NUMBER
    ))
    .unwrap()
});

// Calendar date (YYYY-MM-DD) or ordinal date (YYYY-DDD), then time and zone.
static EPOCH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})-(?:(\d{2})-(\d{2})|(\d{3}))T(\d{2}):(\d{2}):(\d{2})(?:\.(\d+))?(Z|[-+]\d{2}:?\d{2})?$",
    )
    .unwrap()
});

/// Parse `[x,y,z]` into three finite components.
pub fn parse_vector(field: &str, text: &str) -> Result<Vector3<f64>> {
    let caps = VECTOR_RE.captures(text).ok_or_else(|| {
        Error::Parse(format!("{}: expected [x,y,z], got {:?}", field, text))
    })?;

    let mut out = [0.0f64; 3];
    for (i, slot) in out.iter_mut().enumerate() {
        let raw = caps[i + 1].replace(['d', 'D'], "e");
        let value: f64 = raw
            .parse()
            .map_err(|_| Error::Parse(format!("{}: invalid number {:?}", field, &caps[i + 1])))?;
        if !value.is_finite() {
            return Err(Error::Parse(format!(
                "{}: component {:?} is not finite",
                field,
                &caps[i + 1]
            )));
        }
        *slot = value;
    }
    Ok(Vector3::from(out))
}

/// Parse an ISO-8601 epoch. A missing zone means UTC.
pub fn parse_epoch(field: &str, text: &str) -> Result<DateTime<Utc>> {
    let bad = || Error::Parse(format!("{}: expected YYYY-MM-DDTHH:MM:SS.sss, got {:?}", field, text));
    let caps = EPOCH_RE.captures(text.trim()).ok_or_else(bad)?;

    let num = |i: usize| -> u32 { caps.get(i).map_or(0, |m| m.as_str().parse().unwrap_or(0)) };
    let year: i32 = caps[1].parse().map_err(|_| bad())?;

    let date = if caps.get(4).is_some() {
        NaiveDate::from_yo_opt(year, num(4))
    } else {
        NaiveDate::from_ymd_opt(year, num(2), num(3))
    }
    .ok_or_else(bad)?;

    let nanos = caps.get(8).map_or(0, |m| fraction_to_nanos(m.as_str()));
    let time = NaiveTime::from_hms_nano_opt(num(5), num(6), num(7), nanos).ok_or_else(bad)?;
    let naive = NaiveDateTime::new(date, time);

    match caps.get(9).map(|m| m.as_str()) {
        None | Some("Z") => Ok(Utc.from_utc_datetime(&naive)),
        Some(zone) => {
            let offset = parse_offset(zone).ok_or_else(bad)?;
            offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(bad)
        }
    }
}

/// Render a vector as `[%f,%f,%f]`.
pub fn render_vector(v: &Vector3<f64>) -> String {
    format!("[{:.6},{:.6},{:.6}]", v.x, v.y, v.z)
}

/// Render an epoch as `YYYY-MM-DDTHH:MM:SS.sssZ`.
pub fn render_epoch(epoch: &DateTime<Utc>) -> String {
    epoch.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn fraction_to_nanos(digits: &str) -> u32 {
    let mut padded: String = digits.chars().take(9).collect();
    while padded.len() < 9 {
        padded.push('0');
    }
    padded.parse().unwrap_or(0)
}

fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let sign = if zone.starts_with('-') { -1 } else { 1 };
    let digits: String = zone[1..].chars().filter(|c| c.is_ascii_digit()).collect();
    let hours: i32 = digits.get(0..2)?.parse().ok()?;
    let minutes: i32 = digits.get(2..4)?.parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
