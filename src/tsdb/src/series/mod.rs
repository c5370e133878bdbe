//! Series key parsing.  A series key is the escaped text form
//! `measurement,tagK=tagV,...` where `,`, ` ` and `=` are backslash-escaped
//! inside the measurement, tag keys and tag values.

use std::collections::BTreeMap;

/// parse_series_key splits a series key into its measurement and tag map.
/// The measurement keeps its wire escaping; tag keys and values are
/// unescaped.
pub fn parse_series_key(buf: &[u8]) -> anyhow::Result<(String, BTreeMap<String, String>)> {
    let s = std::str::from_utf8(buf)
        .map_err(|_| anyhow!("series key is not valid utf-8: {:?}", buf))?;

    let segments = split_unescaped(s, b',');
    let measurement = segments
        .first()
        .copied()
        .unwrap_or("");
    if measurement.is_empty() {
        return Err(anyhow!("series key parse failed: measurement can not be empty"));
    }

    let mut tags = BTreeMap::new();
    for kv in &segments[1..] {
        let Some(eq) = find_unescaped(kv, b'=') else {
            continue;
        };

        let tag_key = &kv[..eq];
        let tag_value = &kv[eq + 1..];
        if tag_key.is_empty() || tag_value.is_empty() {
            return Err(anyhow!(
                "series key parse failed: empty tag key or tag value in {:?}",
                s
            ));
        }
        tags.insert(unescape_tag(tag_key), unescape_tag(tag_value));
    }

    Ok((measurement.to_string(), tags))
}

/// split_unescaped splits s on every occurrence of sep that is not preceded
/// by a backslash.
fn split_unescaped(s: &str, sep: u8) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut escaping = false;

    for (i, &b) in bytes.iter().enumerate() {
        if escaping {
            escaping = false;
            continue;
        }
        if b == b'\\' {
            escaping = true;
            continue;
        }
        if b == sep {
            out.push(&s[start..i]);
            start = i + 1;
        }
    }
    out.push(&s[start..]);
    out
}

/// find_unescaped returns the byte position of the first occurrence of sep
/// that is not preceded by a backslash.
fn find_unescaped(s: &str, sep: u8) -> Option<usize> {
    let mut escaping = false;
    for (i, &b) in s.as_bytes().iter().enumerate() {
        if escaping {
            escaping = false;
            continue;
        }
        if b == b'\\' {
            escaping = true;
            continue;
        }
        if b == sep {
            return Some(i);
        }
    }
    None
}

/// unescape_tag removes the backslash escapes from a tag key or value.
pub fn unescape_tag(s: &str) -> String {
    if !s.contains('\\') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut escaping = false;
    for c in s.chars() {
        if escaping {
            out.push(c);
            escaping = false;
            continue;
        }
        if c == '\\' {
            escaping = true;
            continue;
        }
        out.push(c);
    }
    if escaping {
        out.push('\\');
    }
    out
}

/// escape_tag backslash-escapes the line protocol reserved characters in a
/// tag key, tag value or field key.
pub fn escape_tag(s: &str) -> String {
    if !s.contains([',', ' ', '=']) {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        if c == ',' || c == ' ' || c == '=' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
