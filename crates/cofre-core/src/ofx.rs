//! OFX (Open Financial Exchange) statement parser
//!
//! Brazilian banks ship OFX 1.x (SGML, unclosed tags) and occasionally
//! OFX 2.x (XML). Both carry the same `<STMTTRN>` blocks, so one tag
//! scanner handles them.

use regex::Regex;
use tracing::debug;

use crate::import::dedup_hash;
use crate::models::{Flow, ParseOutcome, ParseRowError, ParsedTransaction, StatementMetadata};
use crate::normalize::parse_date;

/// Extract the value of an OFX tag (SGML form: `<TAG>value`)
fn extract_tag(block: &str, tag: &str) -> Option<String> {
    let re = Regex::new(&format!(r"(?i)<{}>([^<\r\n]+)", tag)).ok()?;
    re.captures(block)
        .map(|cap| cap[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Map an OFX TRNTYPE to a flow, falling back to the amount's sign
fn flow_from_trntype(trn_type: &str, signed_value: f64) -> Flow {
    let upper = trn_type.to_uppercase();
    if upper.contains("CREDIT") || upper.contains("DEP") {
        return Flow::Credit;
    }
    if upper.contains("DEBIT") || upper.contains("PAYMENT") || upper.contains("FEE") {
        return Flow::Debit;
    }
    Flow::from_signed(signed_value)
}

/// OFX dates are `YYYYMMDD` or `YYYYMMDDHHMMSS`, sometimes with a
/// `[offset:TZ]` suffix
fn parse_ofx_date(raw: &str) -> Option<chrono::NaiveDate> {
    let cleaned = raw.split('[').next()?.trim();
    if cleaned.len() < 8 {
        return None;
    }
    parse_date(&cleaned[..8], None)
}

/// Parse an OFX statement into transactions.
///
/// Malformed `<STMTTRN>` blocks are skipped and counted, never fatal.
pub fn parse_ofx(content: &str) -> ParseOutcome {
    let mut transactions = Vec::new();
    let mut errors = Vec::new();

    let metadata = StatementMetadata {
        source_format: "ofx".to_string(),
        institution: None,
        currency: extract_tag(content, "CURDEF"),
        bank_id: extract_tag(content, "BANKID"),
        account_id: extract_tag(content, "ACCTID"),
    };

    let currency = metadata.currency.clone().unwrap_or_else(|| "BRL".to_string());

    let block_re = Regex::new(r"(?is)<STMTTRN>(.*?)</STMTTRN>").expect("static regex");

    let mut rows_total = 0usize;
    for (idx, cap) in block_re.captures_iter(content).enumerate() {
        let row = idx + 1;
        rows_total += 1;
        let block = &cap[1];

        let date = match extract_tag(block, "DTPOSTED").and_then(|d| parse_ofx_date(&d)) {
            Some(d) => d,
            None => {
                errors.push(ParseRowError {
                    row,
                    field: Some("date".to_string()),
                    message: "invalid or missing DTPOSTED".to_string(),
                });
                continue;
            }
        };

        let signed_value = match extract_tag(block, "TRNAMT").and_then(|v| v.parse::<f64>().ok()) {
            Some(v) => v,
            None => {
                errors.push(ParseRowError {
                    row,
                    field: Some("amount".to_string()),
                    message: "invalid or missing TRNAMT".to_string(),
                });
                continue;
            }
        };

        let trn_type = extract_tag(block, "TRNTYPE").unwrap_or_else(|| "OTHER".to_string());
        let flow = flow_from_trntype(&trn_type, signed_value);
        let amount = signed_value.abs();

        // Description comes from MEMO, falling back to NAME
        let description = extract_tag(block, "MEMO")
            .or_else(|| extract_tag(block, "NAME"))
            .unwrap_or_else(|| "OFX transaction".to_string());

        let document_ref = extract_tag(block, "FITID").or_else(|| extract_tag(block, "CHECKNUM"));

        transactions.push(ParsedTransaction {
            dedup_hash: dedup_hash(&date, &description, amount, flow, document_ref.as_deref()),
            date,
            description,
            amount,
            flow,
            document_ref,
            running_balance: None,
            currency: currency.clone(),
            counterparty: None,
            source_row: row,
        });
    }

    debug!(
        transactions = transactions.len(),
        skipped = errors.len(),
        "Parsed OFX statement"
    );

    ParseOutcome {
        transactions,
        metadata,
        errors,
        rows_total,
    }
}
