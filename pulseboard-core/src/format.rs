//! Display helpers for byte counts, speeds, uptimes and regions

use chrono::{DateTime, Utc};

const UNITS: [&str; 9] = ["Bytes", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];
const REGIONAL_A: u32 = 0x1F1E6;
const REGIONAL_Z: u32 = 0x1F1FF;

fn trim_decimals(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Binary units with at most two decimals, e.g. `1.5 KiB`
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{} {}", trim_decimals(format!("{value:.2}")), UNITS[unit])
}

/// Bytes per second as `M/s`, or `G/s` from 1024 M/s up
pub fn format_speed(bytes_per_sec: u64) -> String {
    let mbps = bytes_per_sec as f64 / 1024.0 / 1024.0;
    if mbps >= 1024.0 {
        format!("{:.2} G/s", mbps / 1024.0)
    } else {
        format!("{mbps:.2} M/s")
    }
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    if days >= 1 {
        format!("{days} Days {hours} Hours")
    } else {
        format!("{hours} Hours")
    }
}

/// Compact age of a timestamp: `3d`, `5h`, `12m` or `40s`
pub fn format_relative(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    let hours = secs / 3_600;
    let minutes = (secs % 3_600) / 60;
    if hours > 24 {
        format!("{}d", hours / 24)
    } else if hours > 0 {
        format!("{hours}h")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{}s", secs % 60)
    }
}

/// Age of an RFC 3339 report time at `now`; `None` when absent or unparsable
pub fn format_age(updated_at: &str, now: DateTime<Utc>) -> Option<String> {
    let at = DateTime::parse_from_rfc3339(updated_at).ok()?;
    Some(format_relative(now.signed_duration_since(at)))
}

fn regional_letter(c: char) -> Option<char> {
    let cp = c as u32;
    if (REGIONAL_A..=REGIONAL_Z).contains(&cp) {
        char::from_u32('A' as u32 + (cp - REGIONAL_A))
    } else {
        None
    }
}

/// Two-letter country code of a region.
///
/// Plain codes are upper-cased; a flag emoji is decoded from its regional
/// indicator pair. Empty regions have no code.
pub fn country_code(region: &str) -> Option<String> {
    let region = region.trim();
    if region.is_empty() {
        return None;
    }
    let chars: Vec<char> = region.chars().collect();
    let flag = chars
        .windows(2)
        .find_map(|pair| Some([regional_letter(pair[0])?, regional_letter(pair[1])?]));
    match flag {
        Some([a, b]) => Some([a, b].iter().collect()),
        None => Some(region.to_uppercase()),
    }
}
