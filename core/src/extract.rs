//! Daily extract parsing — the thin I/O edge of the pipeline.
//!
//! Transactions arrive as the semicolon-delimited text extract with
//! decimal-comma amounts; terminal and passport extracts arrive as CSV
//! renditions of the upstream spreadsheet sheets (spreadsheet decoding
//! itself stays with the producing system). Filenames embed the batch
//! date as DDMMYYYY.

use crate::{
    error::{EtlError, EtlResult},
    passport::PassportBlacklistRecord,
    terminal::TerminalRecord,
    transaction::TransactionFact,
    types::{date_to_text, ts_from_text, DATE_FORMAT},
};
use chrono::NaiveDate;

/// The three extract kinds, distinguished by filename stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractKind {
    Terminals,
    PassportBlacklist,
    Transactions,
}

/// Recognize `terminals_DDMMYYYY.csv`, `passport_blacklist_DDMMYYYY.csv`
/// and `transactions_DDMMYYYY.txt`; anything else is not an extract.
pub fn classify_filename(name: &str) -> Option<(ExtractKind, NaiveDate)> {
    let (kind, rest) = if let Some(r) = name.strip_prefix("terminals_") {
        (ExtractKind::Terminals, r)
    } else if let Some(r) = name.strip_prefix("passport_blacklist_") {
        (ExtractKind::PassportBlacklist, r)
    } else if let Some(r) = name.strip_prefix("transactions_") {
        (ExtractKind::Transactions, r)
    } else {
        return None;
    };
    let stem = match kind {
        ExtractKind::Transactions => rest.strip_suffix(".txt")?,
        _ => rest.strip_suffix(".csv")?,
    };
    if stem.len() != 8 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(stem, "%d%m%Y")
        .ok()
        .map(|date| (kind, date))
}

/// Columns: terminal_id;terminal_type;terminal_city;terminal_address.
/// Empty attribute fields become NULL.
pub fn parse_terminals(text: &str, file: &str) -> EtlResult<Vec<TerminalRecord>> {
    let mut out = Vec::new();
    for (line_no, line) in data_lines(text, "terminal_id") {
        let fields: Vec<&str> = line.split(';').map(str::trim).collect();
        let terminal_id = require(&fields, 0, file, line_no, "terminal_id")?;
        out.push(TerminalRecord {
            terminal_id,
            terminal_type: optional(&fields, 1),
            terminal_city: optional(&fields, 2),
            terminal_address: optional(&fields, 3),
        });
    }
    Ok(out)
}

/// Columns: date;passport — the upstream blacklist sheet layout.
pub fn parse_passports(text: &str, file: &str) -> EtlResult<Vec<PassportBlacklistRecord>> {
    let mut out = Vec::new();
    for (line_no, line) in data_lines(text, "date") {
        let fields: Vec<&str> = line.split(';').map(str::trim).collect();
        let entry_raw = require(&fields, 0, file, line_no, "date")?;
        let passport_num = require(&fields, 1, file, line_no, "passport")?;
        let entry = NaiveDate::parse_from_str(&entry_raw, DATE_FORMAT).map_err(|_| {
            EtlError::Malformed {
                file: file.to_string(),
                line: line_no,
                reason: format!("bad blacklist entry date '{entry_raw}'"),
            }
        })?;
        out.push(PassportBlacklistRecord {
            passport_num,
            entry_dt: Some(date_to_text(entry)),
        });
    }
    Ok(out)
}

/// Columns: transaction_id;transaction_date;card_num;oper_type;amount;
/// oper_result;terminal. Amounts are decimal-comma.
pub fn parse_transactions(text: &str, file: &str) -> EtlResult<Vec<TransactionFact>> {
    let mut out = Vec::new();
    for (line_no, line) in data_lines(text, "transaction_id") {
        let fields: Vec<&str> = line.split(';').map(str::trim).collect();
        if fields.len() != 7 {
            return Err(EtlError::Malformed {
                file: file.to_string(),
                line: line_no,
                reason: format!("expected 7 fields, got {}", fields.len()),
            });
        }
        let trans_date = ts_from_text(fields[1]).ok_or_else(|| EtlError::Malformed {
            file: file.to_string(),
            line: line_no,
            reason: format!("bad transaction date '{}'", fields[1]),
        })?;
        let amount = fields[4].parse().map_err(|reason| EtlError::Malformed {
            file: file.to_string(),
            line: line_no,
            reason,
        })?;
        out.push(TransactionFact {
            trans_id: fields[0].to_string(),
            trans_date,
            card_num: fields[2].to_string(),
            oper_type: fields[3].to_string(),
            amount,
            oper_result: fields[5].to_string(),
            terminal: fields[6].to_string(),
        });
    }
    Ok(out)
}

/// Non-empty lines with 1-based numbers, skipping a leading header line
/// that starts with `header_prefix`.
fn data_lines<'t>(
    text: &'t str,
    header_prefix: &'t str,
) -> impl Iterator<Item = (usize, &'t str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(move |(line_no, l)| {
            !l.is_empty() && !(*line_no == 1 && l.starts_with(header_prefix))
        })
}

fn require(
    fields: &[&str],
    idx: usize,
    file: &str,
    line: usize,
    name: &str,
) -> EtlResult<String> {
    match fields.get(idx) {
        Some(v) if !v.is_empty() => Ok((*v).to_string()),
        _ => Err(EtlError::Malformed {
            file: file.to_string(),
            line,
            reason: format!("missing {name}"),
        }),
    }
}

fn optional(fields: &[&str], idx: usize) -> Option<String> {
    fields
        .get(idx)
        .filter(|v| !v.is_empty())
        .map(|v| (*v).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Money;

    #[test]
    fn classifies_extract_filenames() {
        let (kind, date) = classify_filename("terminals_01032021.csv").unwrap();
        assert_eq!(kind, ExtractKind::Terminals);
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 3, 1).unwrap());

        let (kind, _) = classify_filename("passport_blacklist_02032021.csv").unwrap();
        assert_eq!(kind, ExtractKind::PassportBlacklist);

        let (kind, _) = classify_filename("transactions_02032021.txt").unwrap();
        assert_eq!(kind, ExtractKind::Transactions);

        assert!(classify_filename("transactions_02032021.csv").is_none());
        assert!(classify_filename("terminals_0203202.csv").is_none());
        assert!(classify_filename("notes.txt").is_none());
        assert!(classify_filename("terminals_99999999.csv").is_none());
    }

    #[test]
    fn parses_terminal_rows_with_nulls() {
        let text = "terminal_id;terminal_type;terminal_city;terminal_address\n\
                    T1;POS;Moscow;Tverskaya 1\n\
                    T2;ATM;;\n";
        let rows = parse_terminals(text, "terminals_01032021.csv").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].terminal_id, "T2");
        assert_eq!(rows[1].terminal_city, None);
    }

    #[test]
    fn parses_transactions_with_decimal_comma() {
        let text = "transaction_id;transaction_date;card_num;oper_type;amount;oper_result;terminal\n\
                    X1;2021-03-01 10:15:00;1234 5678 9012 3456;PAYMENT;1234,56;SUCCESS;T1\n";
        let rows = parse_transactions(text, "transactions_01032021.txt").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, Money::from_minor(123456));
        assert_eq!(rows[0].terminal, "T1");
    }

    #[test]
    fn malformed_transaction_line_is_an_error() {
        let text = "X1;2021-03-01 10:15:00;1234;PAYMENT;1,2,3;SUCCESS;T1\n";
        let err = parse_transactions(text, "transactions_01032021.txt").unwrap_err();
        assert!(err.to_string().contains("line 1"), "got: {err}");
    }

    #[test]
    fn passport_rows_normalize_entry_date() {
        let text = "date;passport\n2021-02-28;4512 123456\n";
        let rows = parse_passports(text, "passport_blacklist_01032021.csv").unwrap();
        assert_eq!(rows[0].passport_num, "4512 123456");
        assert_eq!(rows[0].entry_dt.as_deref(), Some("2021-02-28"));
    }
}
