//! Description, value and date normalization
//!
//! `normalize` is the single canonical form used for rule matching, cache
//! keys and dedup hashing. If any of those call sites normalized differently
//! they would silently desynchronize, so they all go through here.

use chrono::NaiveDate;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonicalize a free-text transaction description.
///
/// Trims, upper-cases, strips diacritics (NFD decomposition followed by
/// combining-mark removal), collapses whitespace, and drops everything that
/// is not alphanumeric, space, `*`, `-` or `/`.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .trim()
        .to_uppercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let kept: String = folded
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '*' | '-' | '/') {
                c
            } else {
                ' '
            }
        })
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a monetary value string using the layout's declared decimal
/// separator, stripping currency symbols and thousands separators first.
///
/// When both `,` and `.` are present the decimal separator is inferred from
/// whichever comes last, which handles files that disagree with their
/// declared layout (1.234,56 vs 1,234.56).
pub fn parse_value(raw: &str, decimal_separator: char) -> Option<f64> {
    let mut cleaned: String = raw
        .trim()
        .trim_matches('"')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    for prefix in ["R$", "US$", "USD", "EUR", "BRL", "$"] {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest.to_string();
            break;
        }
    }

    // Parenthesized and minus-signed values are both negative
    let negative = cleaned.starts_with('-') || cleaned.starts_with('(');
    cleaned = cleaned
        .trim_start_matches(['-', '('])
        .trim_end_matches(')')
        .to_string();

    let has_comma = cleaned.contains(',');
    let has_dot = cleaned.contains('.');

    let numeric = if has_comma && has_dot {
        let last_comma = cleaned.rfind(',').unwrap();
        let last_dot = cleaned.rfind('.').unwrap();
        if last_comma > last_dot {
            // 1.234,56
            cleaned.replace('.', "").replace(',', ".")
        } else {
            // 1,234.56
            cleaned.replace(',', "")
        }
    } else if has_comma {
        if decimal_separator == ',' {
            cleaned.replace(',', ".")
        } else {
            cleaned.replace(',', "")
        }
    } else if has_dot && decimal_separator == ',' {
        // Lone dots under a comma-decimal layout are thousands separators,
        // unless the fraction looks like decimals (e.g. "39.90")
        let parts: Vec<&str> = cleaned.split('.').collect();
        if parts.len() == 2 && parts[1].len() <= 2 {
            cleaned
        } else {
            cleaned.replace('.', "")
        }
    } else {
        cleaned
    };

    let value: f64 = numeric.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Parse a date string in the formats bank exports actually use.
///
/// An explicit chrono format from the field layout is tried first, then the
/// generic patterns: DD/MM/YYYY and variants, ISO, bare YYYYMMDD (OFX), and
/// two-digit years with a pivot at 50.
pub fn parse_date(raw: &str, layout_format: Option<&str>) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(fmt) = layout_format {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    // OFX-style compact date
    if s.len() == 8 && s.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y%m%d") {
            return Some(date);
        }
    }

    let formats = [
        "%d/%m/%Y", // 15/01/2024
        "%d-%m-%Y", // 15-01-2024
        "%d.%m.%Y", // 15.01.2024
        "%Y-%m-%d", // 2024-01-15
        "%Y/%m/%d", // 2024/01/15
    ];
    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    parse_two_digit_year(s)
}

/// DD/MM/YY and DD-MM-YY with the pivot banks use: 00-49 -> 2000s, 50-99 -> 1900s
fn parse_two_digit_year(s: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.split(['/', '-']).collect();
    if parts.len() != 3 || parts[2].len() != 2 {
        return None;
    }
    let day: u32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let yy: i32 = parts[2].parse().ok()?;
    let year = if yy < 50 { 2000 + yy } else { 1900 + yy };
    NaiveDate::from_ymd_opt(year, month, day)
}
