//! Directory listing and timestamp formats

use std::time::SystemTime;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

use crate::adapter::AdapterFileInfo;

/// Entries older than this show a year instead of a time
fn recent() -> Duration {
    Duration::days(180)
}

/// One `ls -l` style line, without the line terminator.
pub fn format_list_line(info: &AdapterFileInfo, now: DateTime<Utc>) -> String {
    let modified: DateTime<Utc> = info.modified().into();
    let date = if now.signed_duration_since(modified) > recent() || modified > now {
        modified.format("%b %d  %Y")
    } else {
        modified.format("%b %d %H:%M")
    };
    format!(
        "{}{} 1 owner group {:>12} {} {}",
        if info.is_dir() { 'd' } else { '-' },
        permissions(info.mode()),
        info.size(),
        date,
        info.name()
    )
}

fn permissions(mode: u32) -> String {
    const FLAGS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    FLAGS
        .iter()
        .map(|&(bit, flag)| if mode & bit != 0 { flag } else { '-' })
        .collect()
}

/// `YYYYMMDDHHMMSS` in UTC, as MDTM replies and MFMT arguments use it.
pub fn format_mdtm(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format("%Y%m%d%H%M%S").to_string()
}

pub fn parse_mdtm(text: &str) -> Option<SystemTime> {
    // Fractional seconds are allowed and ignored
    let whole = text.split('.').next()?;
    let naive = NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&naive).into())
}
