//! Statement format detection
//!
//! Best-effort sniffing of uploaded statement files: tagged (OFX) vs
//! delimited, the delimiter dialect, header presence, and encoding.
//! Detection never fails; callers get a guess with a confidence value
//! they may threshold against.

use tracing::debug;

use crate::models::{DetectedFormat, FormatKind, TextEncoding};

/// Candidate separators in precedence order; ties go to the earlier entry
const SEPARATORS: [char; 4] = [';', ',', '\t', '|'];

/// Substrings that mark a file as an OFX export
const OFX_SIGNATURES: [&str; 3] = ["<OFX>", "OFXHEADER:", "<BANKTRANLIST>"];

/// Mis-decoded UTF-8 sequences that betray a Latin-1 file read as UTF-8
const MOJIBAKE: [&str; 4] = ["Ã£", "Ã§", "Ã³", "Ã©"];

/// Detect the format of a statement file from its text content
pub fn detect_format(content: &str) -> DetectedFormat {
    let trimmed = content.trim();

    if trimmed.is_empty() {
        return DetectedFormat {
            kind: FormatKind::Delimited,
            confidence: 0.0,
            separator: Some(','),
            header: None,
            encoding: TextEncoding::Utf8,
        };
    }

    if OFX_SIGNATURES.iter().any(|sig| trimmed.contains(sig)) {
        debug!("Detected tagged (OFX) statement");
        return DetectedFormat {
            kind: FormatKind::Tagged,
            confidence: 0.95,
            separator: None,
            header: None,
            encoding: detect_encoding(trimmed),
        };
    }

    if let Some(first_line) = trimmed.lines().find(|l| !l.trim().is_empty()) {
        if let Some(separator) = detect_separator(first_line) {
            let header = detect_header(first_line, separator);
            debug!(separator = %separator, has_header = header.is_some(), "Detected delimited statement");
            return DetectedFormat {
                kind: FormatKind::Delimited,
                confidence: 0.9,
                separator: Some(separator),
                header,
                encoding: detect_encoding(trimmed),
            };
        }
    }

    // Nothing matched; assume comma-delimited with low confidence
    DetectedFormat {
        kind: FormatKind::Delimited,
        confidence: 0.5,
        separator: Some(','),
        header: None,
        encoding: detect_encoding(trimmed),
    }
}

/// Pick the separator with the most occurrences in the line.
/// Ties resolve to the fixed precedence order in `SEPARATORS`.
pub fn detect_separator(line: &str) -> Option<char> {
    let mut best: Option<(char, usize)> = None;
    for sep in SEPARATORS {
        let count = line.matches(sep).count();
        if count > 0 && best.map_or(true, |(_, c)| count > c) {
            best = Some((sep, count));
        }
    }
    best.map(|(sep, _)| sep)
}

/// The first row is a header iff it has more than one cell and every cell,
/// after stripping quotes, fails to parse as a float.
pub fn detect_header(line: &str, separator: char) -> Option<Vec<String>> {
    let cells: Vec<String> = line
        .split(separator)
        .map(|c| c.trim().trim_matches('"').trim().to_string())
        .collect();

    if cells.len() <= 1 {
        return None;
    }

    let all_text = cells.iter().all(|c| c.parse::<f64>().is_err());
    if all_text {
        Some(cells)
    } else {
        None
    }
}

/// Guess the encoding the file was written in from its decoded text.
///
/// Mojibake sequences are checked before well-formed accents because a
/// Latin-1 file mis-read as UTF-8 also contains accented letters.
pub fn detect_encoding(content: &str) -> TextEncoding {
    if content.starts_with('\u{feff}') {
        return TextEncoding::Utf8Bom;
    }

    if MOJIBAKE.iter().any(|seq| content.contains(seq)) {
        return TextEncoding::Latin1;
    }

    const ACCENTED: &str = "áàâãéêíóôõúüçÁÀÂÃÉÊÍÓÔÕÚÜÇ";
    if content.chars().any(|c| ACCENTED.contains(c)) {
        return TextEncoding::Utf8;
    }

    TextEncoding::Utf8
}

/// Decode raw upload bytes into text.
///
/// Strips a UTF-8 BOM when present; bytes that are not valid UTF-8 are
/// treated as Latin-1, where every byte maps to the code point of the
/// same value.
pub fn decode_bytes(bytes: &[u8]) -> (String, TextEncoding) {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        let text = String::from_utf8_lossy(rest).into_owned();
        return (text, TextEncoding::Utf8Bom);
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), TextEncoding::Utf8),
        Err(_) => {
            let text: String = bytes.iter().map(|&b| b as char).collect();
            (text, TextEncoding::Latin1)
        }
    }
}
