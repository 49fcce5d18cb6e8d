//! Delimited statement parsers for various bank export formats
//!
//! A generic adapter projects rows through a caller-supplied `FieldLayout`;
//! per-institution adapters hardcode the layout their bank actually ships.
//! Bradesco additionally sniffs between its account-statement export, its
//! card-statement export (multi-currency columns) and OFX.
//!
//! Rows that fail a required field (date or amount) are skipped and counted,
//! never fatal to the whole file.

use chrono::{Datelike, NaiveDate};
use csv::ReaderBuilder;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::detect::detect_format;
use crate::error::{Error, Result};
use crate::models::{
    ColumnMap, FieldLayout, Flow, FormatKind, Institution, ParseOutcome, ParseRowError,
    ParsedTransaction, StatementMetadata,
};
use crate::normalize::{normalize, parse_date, parse_value};
use crate::ofx::parse_ofx;

impl Institution {
    /// Built-in field layout for this institution's delimited export
    pub fn layout(&self) -> FieldLayout {
        match self {
            // Data,Categoria,Título,Valor (ISO dates, dot decimals)
            Self::Nubank => FieldLayout {
                separator: ',',
                decimal_separator: '.',
                rows_to_skip: 1,
                date_format: Some("%Y-%m-%d".to_string()),
                currency: "BRL".to_string(),
                columns: ColumnMap {
                    date: 0,
                    description: 2,
                    amount: 3,
                    ..Default::default()
                },
            },
            // Data;Descrição;Valor;Saldo
            Self::Inter => FieldLayout {
                separator: ';',
                decimal_separator: ',',
                rows_to_skip: 1,
                date_format: Some("%d/%m/%Y".to_string()),
                currency: "BRL".to_string(),
                columns: ColumnMap {
                    date: 0,
                    description: 1,
                    amount: 2,
                    balance: Some(3),
                    ..Default::default()
                },
            },
            // Data;Histórico;Número do Documento;Valor;Saldo
            Self::Bradesco => FieldLayout {
                separator: ';',
                decimal_separator: ',',
                rows_to_skip: 1,
                date_format: Some("%d/%m/%Y".to_string()),
                currency: "BRL".to_string(),
                columns: ColumnMap {
                    date: 0,
                    description: 1,
                    amount: 3,
                    document: Some(2),
                    balance: Some(4),
                    ..Default::default()
                },
            },
            // data,lançamento,ag.,conta,valor
            Self::Itau => FieldLayout {
                separator: ',',
                decimal_separator: ',',
                rows_to_skip: 1,
                date_format: Some("%d/%m/%Y".to_string()),
                currency: "BRL".to_string(),
                columns: ColumnMap {
                    date: 0,
                    description: 1,
                    amount: 4,
                    ..Default::default()
                },
            },
            // Data;Descrição;Número;Agência;Valor;Saldo
            Self::Santander => FieldLayout {
                separator: ';',
                decimal_separator: ',',
                rows_to_skip: 1,
                date_format: Some("%d/%m/%Y".to_string()),
                currency: "BRL".to_string(),
                columns: ColumnMap {
                    date: 0,
                    description: 1,
                    amount: 4,
                    document: Some(2),
                    balance: Some(5),
                    ..Default::default()
                },
            },
            // Data;Histórico;DocIdentificador;ValorTransacao;SaldoContaCorrente
            Self::BancoDoBrasil => FieldLayout {
                separator: ';',
                decimal_separator: ',',
                rows_to_skip: 1,
                date_format: Some("%d/%m/%Y".to_string()),
                currency: "BRL".to_string(),
                columns: ColumnMap {
                    date: 0,
                    description: 1,
                    amount: 3,
                    document: Some(2),
                    balance: Some(4),
                    ..Default::default()
                },
            },
        }
    }
}

/// Detect the issuing institution from file content.
///
/// Checks fixed substrings including the OFX `<BANKID>` codes the Brazilian
/// banks use. Returns None when nothing matches.
pub fn detect_institution(content: &str) -> Option<Institution> {
    let upper = content.to_uppercase();

    let rules: [(Institution, &[&str]); 6] = [
        (
            Institution::Bradesco,
            &["BRADESCO", "EXTRATO DE:", "<BANKID>0237"],
        ),
        (Institution::Itau, &["ITAU", "ITAÚ", "<BANKID>341"]),
        (Institution::Nubank, &["NUBANK", "NU PAGAMENTOS"]),
        (Institution::Inter, &["BANCO INTER", "<BANKID>077"]),
        (Institution::Santander, &["SANTANDER", "<BANKID>033"]),
        (
            Institution::BancoDoBrasil,
            &["BANCO DO BRASIL", "<BANKID>001"],
        ),
    ];

    for (institution, patterns) in rules {
        if patterns.iter().any(|p| upper.contains(p)) {
            return Some(institution);
        }
    }

    None
}

/// Suggest a column mapping from header cell names.
///
/// Matches accent-folded header names against the keywords Brazilian and
/// international exports actually use. Returns None when any of the
/// required fields (date, description, amount) cannot be located.
pub fn suggest_layout(headers: &[String]) -> Option<ColumnMap> {
    let folded: Vec<String> = headers.iter().map(|h| normalize(h)).collect();

    let find = |keywords: &[&str]| -> Option<usize> {
        folded
            .iter()
            .position(|h| keywords.iter().any(|k| h.contains(k)))
    };

    let date = find(&["DATA", "DATE", "DIA"])?;
    let description = find(&[
        "DESCRICAO",
        "HISTORICO",
        "DESCRIPTION",
        "TITULO",
        "LANCAMENTO",
    ])?;
    let amount = find(&["VALOR", "AMOUNT", "VALUE", "MONTANTE"])?;

    Some(ColumnMap {
        date,
        description,
        amount,
        flow: find(&["TIPO", "TYPE", "NATUREZA"]),
        document: find(&["DOCUMENTO", "DOC", "NUMERO"]),
        balance: find(&["SALDO", "BALANCE"]),
    })
}

/// Generate a dedup hash over the fields that identify a transaction.
///
/// The description is normalized first so the hash agrees with rule
/// matching and cache keys. The document reference, when a bank provides
/// one, distinguishes same-day same-amount repeats.
pub fn dedup_hash(
    date: &NaiveDate,
    description: &str,
    amount: f64,
    flow: Flow,
    document_ref: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(date.to_string().as_bytes());
    hasher.update(normalize(description).as_bytes());
    hasher.update(amount.to_be_bytes());
    hasher.update(flow.as_str().as_bytes());
    if let Some(doc) = document_ref {
        hasher.update(doc.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Read a credit/debit keyword cell, falling back to the value's sign
fn detect_flow(cell: &str, signed_value: f64) -> Flow {
    let folded = normalize(cell);
    if ["CREDITO", "CREDIT", "RECEITA", "ENTRADA"]
        .iter()
        .any(|k| folded.contains(k))
    {
        return Flow::Credit;
    }
    if ["DEBITO", "DEBIT", "DESPESA", "SAIDA"]
        .iter()
        .any(|k| folded.contains(k))
    {
        return Flow::Debit;
    }
    Flow::from_signed(signed_value)
}

/// Parse a delimited statement through a field layout.
///
/// This is the generic adapter: the layout comes from an institution
/// preset, from `suggest_layout`, or from the interactive mapping
/// collaborator.
pub fn parse_delimited(content: &str, layout: &FieldLayout) -> ParseOutcome {
    let mut transactions = Vec::new();
    let mut errors = Vec::new();
    let mut rows_total = 0usize;

    let mut rdr = ReaderBuilder::new()
        .delimiter(layout.separator as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    for (idx, result) in rdr.records().enumerate() {
        let row = idx + 1;
        if idx < layout.rows_to_skip {
            continue;
        }

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                rows_total += 1;
                errors.push(ParseRowError {
                    row,
                    field: None,
                    message: e.to_string(),
                });
                continue;
            }
        };

        // Skip blank filler rows without counting them as failures
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        rows_total += 1;

        let date_str = record.get(layout.columns.date).unwrap_or("").trim();
        let description = record
            .get(layout.columns.description)
            .unwrap_or("")
            .trim()
            .to_string();
        let amount_str = record.get(layout.columns.amount).unwrap_or("").trim();

        if date_str.is_empty() || description.is_empty() || amount_str.is_empty() {
            errors.push(ParseRowError {
                row,
                field: None,
                message: "missing required field (date, description or amount)".to_string(),
            });
            continue;
        }

        let date = match parse_date(date_str, layout.date_format.as_deref()) {
            Some(d) => d,
            None => {
                errors.push(ParseRowError {
                    row,
                    field: Some("date".to_string()),
                    message: format!("unable to parse date: \"{}\"", date_str),
                });
                continue;
            }
        };

        let signed_value = match parse_value(amount_str, layout.decimal_separator) {
            Some(v) => v,
            None => {
                errors.push(ParseRowError {
                    row,
                    field: Some("amount".to_string()),
                    message: format!("unable to parse amount: \"{}\"", amount_str),
                });
                continue;
            }
        };

        let flow = match layout.columns.flow.and_then(|i| record.get(i)) {
            Some(cell) if !cell.trim().is_empty() => detect_flow(cell, signed_value),
            _ => Flow::from_signed(signed_value),
        };

        let document_ref = layout
            .columns
            .document
            .and_then(|i| record.get(i))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let running_balance = layout
            .columns
            .balance
            .and_then(|i| record.get(i))
            .and_then(|s| parse_value(s, layout.decimal_separator));

        let amount = signed_value.abs();

        transactions.push(ParsedTransaction {
            dedup_hash: dedup_hash(&date, &description, amount, flow, document_ref.as_deref()),
            date,
            description,
            amount,
            flow,
            document_ref,
            running_balance,
            currency: layout.currency.clone(),
            counterparty: None,
            source_row: row,
        });
    }

    debug!(
        transactions = transactions.len(),
        skipped = errors.len(),
        "Parsed delimited statement"
    );

    ParseOutcome {
        transactions,
        metadata: StatementMetadata {
            source_format: "delimited".to_string(),
            currency: Some(layout.currency.clone()),
            ..Default::default()
        },
        errors,
        rows_total,
    }
}

/// Bradesco export sub-formats, distinguished by fixed signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BradescoVariant {
    /// Plain account statement ("Extrato de: ... Ag: ... Conta: ...")
    Account,
    /// Card statement with USD/BRL columns ("Situação da Fatura:")
    Card,
    /// OFX export
    Tagged,
    Unknown,
}

/// Sniff which Bradesco export variant this file is
pub fn detect_bradesco_variant(content: &str) -> BradescoVariant {
    if content.contains("OFXHEADER") || content.contains("<OFX>") {
        return BradescoVariant::Tagged;
    }
    if content.contains("Extrato de:") && content.contains("Ag:") && content.contains("Conta:") {
        return BradescoVariant::Account;
    }
    if content.contains("Situação da Fatura:") {
        return BradescoVariant::Card;
    }
    BradescoVariant::Unknown
}

/// Parse any statement for a known institution.
///
/// Most institutions go through the generic delimited adapter with their
/// preset layout; Bradesco routes through its variant sniffer first.
pub fn parse_statement(content: &str, institution: Institution) -> ParseOutcome {
    let mut outcome = match institution {
        Institution::Bradesco => match detect_bradesco_variant(content) {
            BradescoVariant::Account => parse_bradesco_account(content),
            BradescoVariant::Card => parse_bradesco_card(content),
            BradescoVariant::Tagged => parse_ofx(content),
            BradescoVariant::Unknown => parse_delimited(content, &institution.layout()),
        },
        _ => {
            let mut out = parse_delimited(content, &institution.layout());
            out.metadata.source_format = format!("{}_csv", institution);
            out
        }
    };
    outcome.metadata.institution = Some(institution);
    outcome
}

/// Parse a statement of unknown provenance.
///
/// Institution signatures are tried first; otherwise the format detector
/// picks the dialect and a layout is derived from the header row. Fails
/// with a parse error only when no adapter can be resolved at all; the
/// caller then asks the interactive mapping collaborator for a layout.
pub fn parse_auto(content: &str) -> Result<ParseOutcome> {
    if let Some(institution) = detect_institution(content) {
        return Ok(parse_statement(content, institution));
    }

    let format = detect_format(content);
    match format.kind {
        FormatKind::Tagged => Ok(parse_ofx(content)),
        FormatKind::Delimited => {
            let header = format.header.as_ref().ok_or_else(|| {
                Error::Parse(
                    "unrecognized statement format: unknown institution and no header row \
                     to derive a layout from"
                        .to_string(),
                )
            })?;
            let columns = suggest_layout(header).ok_or_else(|| {
                Error::Parse(format!(
                    "could not derive a column mapping from header {:?}",
                    header
                ))
            })?;
            let layout = FieldLayout {
                separator: format.separator.unwrap_or(','),
                decimal_separator: ',',
                rows_to_skip: 1,
                date_format: None,
                currency: "BRL".to_string(),
                columns,
            };
            Ok(parse_delimited(content, &layout))
        }
    }
}

/// Parse the Bradesco account-statement CSV.
///
/// Format: a free-text banner ("Extrato de: ... Ag: NNNN Conta: NNNN-N"),
/// a header row within the first lines, then
/// `Data;Histórico;Docto.;Crédito;Débito;Saldo` rows. Credit and debit live
/// in separate columns; a row can produce one transaction from each.
pub fn parse_bradesco_account(content: &str) -> ParseOutcome {
    let mut transactions = Vec::new();
    let mut errors = Vec::new();
    let mut rows_total = 0usize;
    let mut metadata = StatementMetadata {
        source_format: "bradesco_account".to_string(),
        institution: Some(Institution::Bradesco),
        currency: Some("BRL".to_string()),
        ..Default::default()
    };

    let account_re = Regex::new(r"Conta:\s*([\d-]+)").expect("static regex");
    if let Some(cap) = account_re.captures(content) {
        metadata.account_id = Some(cap[1].to_string());
    }

    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();

    // Header row sits within the first few lines of the banner
    let header_idx = lines
        .iter()
        .take(10)
        .position(|l| l.contains("Data;") && l.contains("Hist"));

    let header_idx = match header_idx {
        Some(i) => i,
        None => {
            errors.push(ParseRowError {
                row: 0,
                field: None,
                message: "transaction header row not found".to_string(),
            });
            return ParseOutcome {
                transactions,
                metadata,
                errors,
                rows_total,
            };
        }
    };

    for (offset, line) in lines.iter().enumerate().skip(header_idx + 1) {
        let row = offset + 1;

        // Footer marks the end of the transaction block
        if line.contains("Total;") || line.contains("Últimos Lançamentos") {
            break;
        }

        // Continuation lines carry no date
        if line.starts_with(";;") {
            continue;
        }
        let parts: Vec<&str> = line.split(';').map(|p| p.trim()).collect();
        if parts.len() < 6 {
            continue;
        }

        // Non-data lines (subtotals etc.) start with text, not a date
        if !parts[0].chars().next().is_some_and(|c| c.is_ascii_digit()) {
            continue;
        }
        rows_total += 1;

        let date = match parse_date(parts[0], None) {
            Some(d) => d,
            None => {
                errors.push(ParseRowError {
                    row,
                    field: Some("date".to_string()),
                    message: format!("unable to parse date: \"{}\"", parts[0]),
                });
                continue;
            }
        };

        let description = parts[1].to_string();
        let document_ref = Some(parts[2].to_string()).filter(|s| !s.is_empty());
        let credit = parse_value(parts[3], ',').unwrap_or(0.0);
        let debit = parse_value(parts[4], ',').unwrap_or(0.0);
        let balance = parse_value(parts[5], ',');

        if credit == 0.0 && debit == 0.0 {
            errors.push(ParseRowError {
                row,
                field: Some("amount".to_string()),
                message: "neither credit nor debit column holds a value".to_string(),
            });
            continue;
        }

        for (value, flow) in [(credit, Flow::Credit), (debit, Flow::Debit)] {
            if value == 0.0 {
                continue;
            }
            let amount = value.abs();
            transactions.push(ParsedTransaction {
                dedup_hash: dedup_hash(&date, &description, amount, flow, document_ref.as_deref()),
                date,
                description: description.clone(),
                amount,
                flow,
                document_ref: document_ref.clone(),
                running_balance: balance,
                currency: "BRL".to_string(),
                counterparty: None,
                source_row: row,
            });
        }
    }

    debug!(
        transactions = transactions.len(),
        "Parsed Bradesco account statement"
    );

    ParseOutcome {
        transactions,
        metadata,
        errors,
        rows_total,
    }
}

/// Parse the Bradesco card-statement CSV (multi-currency columns).
///
/// Transaction rows look like `DD/MM;MERCHANT;USD;BRL`. The statement date
/// from the `Data:` banner supplies the year. Negative BRL values are
/// credits (payments, chargebacks); positive are purchases. Cardholder
/// banner lines attribute the rows that follow them.
pub fn parse_bradesco_card(content: &str) -> ParseOutcome {
    let mut transactions = Vec::new();
    let mut errors = Vec::new();
    let mut rows_total = 0usize;
    let metadata = StatementMetadata {
        source_format: "bradesco_card".to_string(),
        institution: Some(Institution::Bradesco),
        currency: Some("BRL".to_string()),
        ..Default::default()
    };

    let holder_re = Regex::new(r"^([A-Z][A-Z ]+[A-Z])\s*;;;?\s*\d{4}").expect("static regex");
    let tx_re = Regex::new(r"^\d{2}/\d{2};").expect("static regex");

    let mut statement_date: Option<NaiveDate> = None;
    let mut holder: Option<String> = None;

    for (idx, line) in content.lines().enumerate() {
        let row = idx + 1;
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        if line.contains("Total da fatura em Real:") || line.contains("Resumo das Despesas") {
            break;
        }

        if let Some(rest) = line.strip_prefix("Data:") {
            statement_date = parse_date(rest.trim(), None);
            continue;
        }

        if let Some(cap) = holder_re.captures(line) {
            holder = Some(cap[1].trim().to_string());
            continue;
        }

        if !tx_re.is_match(line) {
            continue;
        }
        rows_total += 1;

        let parts: Vec<&str> = line.split(';').map(|p| p.trim()).collect();
        if parts.len() < 4 {
            errors.push(ParseRowError {
                row,
                field: None,
                message: "card row has too few columns".to_string(),
            });
            continue;
        }

        let year = match statement_date {
            Some(d) => d.year(),
            None => {
                errors.push(ParseRowError {
                    row,
                    field: Some("date".to_string()),
                    message: "no statement date to resolve the row's year".to_string(),
                });
                continue;
            }
        };

        let date = match parse_date(&format!("{}/{}", parts[0], year), None) {
            Some(d) => d,
            None => {
                errors.push(ParseRowError {
                    row,
                    field: Some("date".to_string()),
                    message: format!("unable to parse date: \"{}\"", parts[0]),
                });
                continue;
            }
        };

        let description = parts[1].to_string();
        let usd = parse_value(parts[2], ',').unwrap_or(0.0);
        let brl = match parse_value(parts[3], ',') {
            Some(v) if v != 0.0 => v,
            _ => {
                errors.push(ParseRowError {
                    row,
                    field: Some("amount".to_string()),
                    message: format!("unable to parse amount: \"{}\"", parts[3]),
                });
                continue;
            }
        };

        // Card convention: purchases are positive, payments/chargebacks negative
        let flow = if brl < 0.0 { Flow::Credit } else { Flow::Debit };
        let amount = brl.abs();
        let currency = if usd.abs() > 0.0 { "USD" } else { "BRL" };

        transactions.push(ParsedTransaction {
            dedup_hash: dedup_hash(&date, &description, amount, flow, None),
            date,
            description,
            amount,
            flow,
            document_ref: None,
            running_balance: None,
            currency: currency.to_string(),
            counterparty: holder.clone(),
            source_row: row,
        });
    }

    debug!(
        transactions = transactions.len(),
        "Parsed Bradesco card statement"
    );

    ParseOutcome {
        transactions,
        metadata,
        errors,
        rows_total,
    }
}
