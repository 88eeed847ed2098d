//! Reference date parsing for test run sets.
//!
//! Without a format, a fixed list of locale-independent layouts is tried in
//! order. With a format, the value must match it exactly. Formats may be
//! written either as `strftime` patterns (anything containing `%`) or as
//! custom date patterns in the `dd/MM/yyyy` style, which are translated.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use super::{ConfigError, ConfigResult};

const DATE_TIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_LAYOUTS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %B %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%b %d, %Y",
];

/// Parses a reference date, optionally against an explicit format.
///
/// An empty format behaves as no format at all.
pub fn parse_reference_date(value: &str, format: Option<&str>) -> ConfigResult<NaiveDateTime> {
    match format.filter(|f| !f.is_empty()) {
        None => parse_general(value).ok_or_else(|| ConfigError::DateParse {
            value: value.to_string(),
            format: None,
        }),
        Some(format) => parse_exact(value, format).ok_or_else(|| ConfigError::DateParse {
            value: value.to_string(),
            format: Some(format.to_string()),
        }),
    }
}

fn parse_general(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }

    DATE_TIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(value, layout).ok())
        .or_else(|| {
            DATE_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDate::parse_from_str(value, layout).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

fn parse_exact(value: &str, format: &str) -> Option<NaiveDateTime> {
    let layout = if format.contains('%') {
        format.to_string()
    } else {
        translate_pattern(format)
    };

    NaiveDateTime::parse_from_str(value, &layout).ok().or_else(|| {
        NaiveDate::parse_from_str(value, &layout)
            .ok()
            .map(|date| date.and_time(NaiveTime::MIN))
    })
}

/// Translates a custom date pattern (`dd/MM/yyyy HH:mm`) to `strftime`.
///
/// Quoted text and backslash-escaped characters are kept literally.
fn translate_pattern(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' || c == '"' {
            i += 1;
            while i < chars.len() && chars[i] != c {
                push_literal(&mut out, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }

        if c == '\\' {
            if let Some(&next) = chars.get(i + 1) {
                push_literal(&mut out, next);
            }
            i += 2;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        let directive = match (c, run) {
            ('y', 1..=2) => Some("%y"),
            ('y', _) => Some("%Y"),
            ('M', 1..=2) => Some("%m"),
            ('M', 3) => Some("%b"),
            ('M', _) => Some("%B"),
            ('d', 1..=2) => Some("%d"),
            ('d', 3) => Some("%a"),
            ('d', _) => Some("%A"),
            ('H', _) => Some("%H"),
            ('h', _) => Some("%I"),
            ('m', _) => Some("%M"),
            ('s', _) => Some("%S"),
            ('f' | 'F', 1..=3) => Some("%3f"),
            ('f' | 'F', 4..=6) => Some("%6f"),
            ('f' | 'F', _) => Some("%9f"),
            ('t', _) => Some("%p"),
            _ => None,
        };

        match directive {
            Some(directive) => out.push_str(directive),
            None => (0..run).for_each(|_| push_literal(&mut out, c)),
        }
        i += run;
    }

    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}
