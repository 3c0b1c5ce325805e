use once_cell::sync::Lazy;
use regex::Regex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

// ----------------------------------------------------------------------------
// Clock
// ----------------------------------------------------------------------------

/// Current wall-clock time in integer nanoseconds since the Unix epoch.
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Nanoseconds since the Unix epoch for a `SystemTime`, 0 when unavailable.
pub fn system_time_ns(time: Option<SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

// ----------------------------------------------------------------------------
// Size values: "<number>[.frac][K|M|G|T|P]?i?B?", multiplier 1024^n
// ----------------------------------------------------------------------------

static SIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+(?:\.\d*)?)([KMGTP]?)I?B?$").unwrap());

/// Parse a size like `10KB`, `1.5MiB` or `500` (bare number = bytes).
pub fn parse_size(input: &str) -> Option<u64> {
    let caps = SIZE_RE.captures(input.trim())?;
    let number: f64 = caps.get(1)?.as_str().parse().ok()?;
    let multiplier: u64 = match caps.get(2)?.as_str().to_ascii_uppercase().as_str() {
        "" => 1,
        "K" => 1 << 10,
        "M" => 1 << 20,
        "G" => 1 << 30,
        "T" => 1 << 40,
        "P" => 1 << 50,
        _ => return None,
    };
    Some((number * multiplier as f64) as u64)
}

/// Human-readable size with SI suffix, trailing zeros trimmed (`10kB`, `1.5MB`).
pub fn human_size(size: u64) -> String {
    let mut value = size as f64;
    for unit in ["B", "kB", "MB", "GB", "TB", "PB"] {
        if value < 1024.0 {
            return format!("{}{}", trim_decimal(&format!("{value:.2}")), unit);
        }
        value /= 1024.0;
    }
    format!("{}EB", trim_decimal(&format!("{value:.2}")))
}

fn trim_decimal(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

// ----------------------------------------------------------------------------
// Durations: "(\d+y)?(\d+mo)?(\d+w)?(\d+d)?(\d+h)?(\d+m)?(\d+s)?" in that
// rigid order. y=365d, mo=30d, w=7d. Result in nanoseconds.
// ----------------------------------------------------------------------------

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(\d+)y)?(?:(\d+)mo)?(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$")
        .unwrap()
});

const DURATION_UNIT_SECS: [i64; 7] = [31_536_000, 2_592_000, 604_800, 86_400, 3_600, 60, 1];

/// Parse a duration like `7d2h` into nanoseconds. At least one unit must be
/// present.
pub fn parse_duration(input: &str) -> Option<i64> {
    let caps = DURATION_RE.captures(input.trim())?;
    let mut any = false;
    let mut total_secs: i64 = 0;
    for (group, unit_secs) in DURATION_UNIT_SECS.iter().enumerate() {
        if let Some(m) = caps.get(group + 1) {
            let value: i64 = m.as_str().parse().ok()?;
            total_secs += value * unit_secs;
            any = true;
        }
    }
    if !any {
        return None;
    }
    Some(total_secs * NANOS_PER_SEC)
}

/// Human-readable duration from whole seconds (`1d1h1m1s`, `0s`).
pub fn human_duration(seconds: i64) -> String {
    let mut remaining = seconds.max(0);
    let mut result = String::new();
    for (name, unit_secs) in [
        ("y", DURATION_UNIT_SECS[0]),
        ("mo", DURATION_UNIT_SECS[1]),
        ("w", DURATION_UNIT_SECS[2]),
        ("d", DURATION_UNIT_SECS[3]),
        ("h", DURATION_UNIT_SECS[4]),
        ("m", DURATION_UNIT_SECS[5]),
        ("s", DURATION_UNIT_SECS[6]),
    ] {
        let value = remaining / unit_secs;
        remaining %= unit_secs;
        if value > 0 {
            result.push_str(&format!("{value}{name}"));
        }
    }
    if result.is_empty() {
        "0s".to_string()
    } else {
        result
    }
}

// ----------------------------------------------------------------------------
// Wall-clock formatting for run summaries
// ----------------------------------------------------------------------------

pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
