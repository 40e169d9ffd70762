//! RB-030: Native configuration records and their config-file renderers.
//!
//! Records are plain data. Anything a proxy needs to share with another
//! proxy (a Unit's Service, a client's profiles) is held as [`Shared`].

pub mod net;
pub mod systemd;

use crate::core::error::{Error, Result};
use regex::Regex;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;
use std::time::Duration;

/// A record shared between a parent record and the proxies that expose it.
pub type Shared<T> = Rc<RefCell<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

static DURATION_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|ms|s|m|h)").expect("static duration pattern")
});

/// Parse a duration like `"1h2m3s"`, `"150ms"` or `"1.5s"`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let invalid = || Error::eval(format!("invalid duration {:?}", s));
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    let mut consumed = 0;
    let mut total: u128 = 0;
    for cap in DURATION_PART.captures_iter(s) {
        let whole = cap.get(0).ok_or_else(invalid)?;
        if whole.start() != consumed {
            return Err(invalid());
        }
        consumed = whole.end();
        let unit: u128 = match &cap[2] {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            _ => 3_600_000_000_000,
        };
        let (int, frac) = cap[1].split_once('.').unwrap_or((&cap[1], ""));
        let int: u128 = if int.is_empty() { 0 } else { int.parse().map_err(|_| invalid())? };
        let mut nanos = int.checked_mul(unit).ok_or_else(invalid)?;
        let mut scale = unit;
        for d in frac.chars().take(18) {
            scale /= 10;
            nanos += u128::from(d.to_digit(10).ok_or_else(invalid)?) * scale;
        }
        total = total.checked_add(nanos).ok_or_else(invalid)?;
    }
    if consumed == 0 || consumed != s.len() {
        return Err(invalid());
    }
    let nanos = u64::try_from(total).map_err(|_| invalid())?;
    Ok(Duration::from_nanos(nanos))
}

/// Render a duration the way `parse_duration` reads it: `5s`, `1m30s`, `1h0m0s`, `150ms`.
pub fn format_duration(d: Duration) -> String {
    let ns = d.as_nanos();
    if ns == 0 {
        return "0s".into();
    }
    if ns < 1_000 {
        return format!("{}ns", ns);
    }
    if ns < 1_000_000 {
        return format!("{}µs", decimal(ns, 1_000));
    }
    if ns < 1_000_000_000 {
        return format!("{}ms", decimal(ns, 1_000_000));
    }
    let hours = ns / 3_600_000_000_000;
    let minutes = (ns / 60_000_000_000) % 60;
    let secs = ns % 60_000_000_000;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h{}m", hours, minutes));
    } else if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    out.push_str(&decimal(secs, 1_000_000_000));
    out.push('s');
    out
}

fn decimal(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let frac = value % unit;
    if frac == 0 {
        return whole.to_string();
    }
    let width = unit.to_string().len() - 1;
    let digits = format!("{:0width$}", frac, width = width);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
