use chrono::format::StrftimeItems;
use chrono::{DateTime, NaiveDateTime};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// current timestamp
pub fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

pub fn unix_nano_to_time(unix_nano: i64) -> NaiveDateTime {
    let secs = unix_nano.div_euclid(1_000_000_000);
    let nsecs = unix_nano.rem_euclid(1_000_000_000);
    NaiveDateTime::from_timestamp_opt(secs, nsecs as u32).unwrap_or(NaiveDateTime::MIN)
}

pub fn time_format(dt: NaiveDateTime) -> String {
    let fmt = StrftimeItems::new("%Y-%m-%d %H:%M:%S");
    format!("{}", dt.format_with_items(fmt))
}

/// parse_rfc3339 parses an RFC3339 timestamp into unix nanoseconds.
pub fn parse_rfc3339(s: &str) -> anyhow::Result<i64> {
    let dt = DateTime::parse_from_rfc3339(s)
        .map_err(|e| anyhow!("invalid RFC3339 timestamp {:?}: {}", s, e))?;
    dt.timestamp_nanos_opt()
        .ok_or_else(|| anyhow!("timestamp {:?} out of the representable nanosecond range", s))
}

/// parse_go_duration parses a duration string in the format emitted by the
/// destination's SHOW RETENTION POLICIES rows, e.g. "168h0m0s" or "1.5h".
/// Accepted units are ns, us (or µs), ms, s, m and h.  Returns nanoseconds.
pub fn parse_go_duration(s: &str) -> anyhow::Result<i64> {
    let orig = s;
    let mut s = s;
    let mut neg = false;

    if let Some(rest) = s.strip_prefix('-') {
        neg = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    if s == "0" {
        return Ok(0);
    }
    if s.is_empty() {
        return Err(anyhow!("invalid duration {:?}", orig));
    }

    let mut total: i64 = 0;
    while !s.is_empty() {
        let digits = s
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(s.len());
        if digits == 0 {
            return Err(anyhow!("invalid duration {:?}", orig));
        }
        let value: f64 = s[..digits]
            .parse()
            .map_err(|_| anyhow!("invalid duration {:?}", orig))?;
        s = &s[digits..];

        let (scale, rest): (i64, &str) = if let Some(r) = s.strip_prefix("ns") {
            (1, r)
        } else if let Some(r) = s.strip_prefix("us") {
            (1_000, r)
        } else if let Some(r) = s.strip_prefix("µs") {
            (1_000, r)
        } else if let Some(r) = s.strip_prefix("ms") {
            (1_000_000, r)
        } else if let Some(r) = s.strip_prefix('s') {
            (1_000_000_000, r)
        } else if let Some(r) = s.strip_prefix('m') {
            (60 * 1_000_000_000, r)
        } else if let Some(r) = s.strip_prefix('h') {
            (3600 * 1_000_000_000, r)
        } else {
            return Err(anyhow!("unknown unit in duration {:?}", orig));
        };
        s = rest;

        total = total
            .checked_add((value * scale as f64) as i64)
            .ok_or_else(|| anyhow!("duration {:?} overflows", orig))?;
    }

    Ok(if neg { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_nano_to_time() {
        let dt = unix_nano_to_time(1_500_000_000_000_000_000);
        assert_eq!(time_format(dt), "2017-07-14 02:40:00");
    }

    #[test]
    fn test_parse_rfc3339() {
        assert_eq!(parse_rfc3339("1970-01-01T00:00:00Z").unwrap(), 0);
        assert_eq!(
            parse_rfc3339("2023-01-01T00:00:00Z").unwrap(),
            1_672_531_200_000_000_000
        );
        assert!(parse_rfc3339("not-a-time").is_err());
    }

    #[test]
    fn test_parse_go_duration() {
        assert_eq!(parse_go_duration("0").unwrap(), 0);
        assert_eq!(parse_go_duration("0s").unwrap(), 0);
        assert_eq!(parse_go_duration("1s").unwrap(), 1_000_000_000);
        assert_eq!(
            parse_go_duration("168h0m0s").unwrap(),
            168 * 3600 * 1_000_000_000
        );
        assert_eq!(parse_go_duration("1h30m").unwrap(), 5400 * 1_000_000_000);
        assert_eq!(parse_go_duration("1.5h").unwrap(), 5400 * 1_000_000_000);
        assert_eq!(parse_go_duration("100ms").unwrap(), 100_000_000);
        assert!(parse_go_duration("12parsecs").is_err());
        assert!(parse_go_duration("").is_err());
    }
}
