//! Tabular inputs: CBS extracts and baseline-balance imports.
//!
//! Core-banking exports have used several header spellings over the years.
//! Headers are normalized (lowercase, alphanumerics only) and matched against
//! the alias lists below; the first matching column wins.

use crate::{error::PmsResult, model::RowError};
use chrono::{DateTime, NaiveDate};
use csv::{ByteRecord, StringRecord};
use serde::Serialize;
use std::io::Read;

const ACCOUNT_ALIASES: &[&str] = &[
    "accountnumber", "accountno", "acctno", "accountnum", "account", "acno", "accountid",
];
const BALANCE_ALIASES: &[&str] = &[
    "balance", "currentbalance", "closingbalance", "ledgerbalance", "availablebalance",
];
const DATE_ALIASES: &[&str] = &[
    "transactiondate", "lasttransactiondate", "txndate", "transdate", "lasttxndate", "valuedate", "date",
];
const PRODUCT_ALIASES: &[&str] = &["product", "productname", "producttype", "productcode", "scheme"];
const AMOUNT_ALIASES: &[&str] = &["amount", "transactionamount", "txnamount", "depositamount", "tranamount"];

const BASELINE_ID_ALIASES: &[&str] = &["accountid", "account_id"];
const BASELINE_BALANCE_ALIASES: &[&str] = &["junebalance", "baselinebalance", "balance"];
const BASELINE_NUMBER_ALIASES: &[&str] = &["accountnumber", "accountno", "alternateaccountnumber"];
const BASELINE_BRANCH_ALIASES: &[&str] = &["branchcode", "branch"];

/// One usable CBS extract row, in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CbsRow {
    /// 1-based data row number (header excluded).
    pub row: usize,
    pub account_number: String,
    pub balance: f64,
    pub transaction_date: Option<NaiveDate>,
    pub product: Option<String>,
    pub amount: f64,
}

#[derive(Debug, Default)]
pub struct CbsExtract {
    pub rows: Vec<CbsRow>,
    pub errors: Vec<RowError>,
}

/// Baseline rows plus the rows that could not be decoded at all.
#[derive(Debug, Default)]
pub struct BaselineFile {
    pub records: Vec<BaselineRecord>,
    pub errors: Vec<RowError>,
}

/// Raw baseline row; validation happens at import.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineRecord {
    pub row: usize,
    pub account_id: String,
    pub june_balance: String,
    pub account_number: Option<String>,
    pub branch_code: Option<String>,
}

/// Lowercase and drop everything that is not a letter or digit.
pub fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn column(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    let normalized: Vec<String> = headers.iter().map(normalize_header).collect();
    aliases.iter().find_map(|alias| {
        let alias = normalize_header(alias);
        normalized.iter().position(|h| *h == alias)
    })
}

fn field<'r>(record: &'r StringRecord, idx: Option<usize>) -> Option<&'r str> {
    idx.and_then(|i| record.get(i)).map(str::trim).filter(|v| !v.is_empty())
}

/// Parse a money figure: thousands separators and a currency code or
/// symbol on either side allowed, parentheses mean negative. Anything else
/// makes the figure unreadable rather than silently different.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let (negative, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner.trim()),
        None => (false, trimmed),
    };
    let body = strip_currency(body);
    let cleaned: String = body.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Drop a leading currency marker ("ETB ", "Br. ", "$") and a trailing one.
/// A bare leading "." is a decimal point, not a marker.
fn strip_currency(body: &str) -> &str {
    let start = body
        .find(|c: char| c.is_ascii_digit() || c == '-')
        .unwrap_or(body.len());
    let prefix = &body[..start];
    let body = if prefix.trim().is_empty() || prefix.trim() == "." {
        body
    } else {
        &body[start..]
    };
    body.trim_end_matches(|c: char| c.is_alphabetic() || c.is_whitespace())
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d-%b-%Y", "%Y/%m/%d", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| {
            NaiveDate::parse_from_str(trimmed, fmt)
                .ok()
                .or_else(|| chrono::NaiveDateTime::parse_from_str(trimmed, fmt).ok().map(|dt| dt.date()))
        })
}

/// Read a CBS extract. Bad rows, including rows that are not valid UTF-8,
/// land in `errors`; only I/O and CSV framing problems fail the whole read.
pub fn read_cbs_extract<R: Read>(reader: R) -> PmsResult<CbsExtract> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let account_col = column(&headers, ACCOUNT_ALIASES);
    let balance_col = column(&headers, BALANCE_ALIASES);
    let date_col = column(&headers, DATE_ALIASES);
    let product_col = column(&headers, PRODUCT_ALIASES);
    let amount_col = column(&headers, AMOUNT_ALIASES);

    let mut extract = CbsExtract::default();
    if account_col.is_none() {
        extract.errors.push(RowError {
            row: 0,
            message: "no account number column in header".into(),
        });
        return Ok(extract);
    }

    for (idx, record) in csv_reader.byte_records().enumerate() {
        let row = idx + 1;
        let record = match decode(row, record?) {
            Ok(record) => record,
            Err(error) => {
                log::warn!("CBS row {row} skipped: {}", error.message);
                extract.errors.push(error);
                continue;
            }
        };
        match cbs_row(row, &record, account_col, balance_col, date_col, product_col, amount_col) {
            Ok(parsed) => extract.rows.push(parsed),
            Err(message) => {
                log::warn!("CBS row {row} skipped: {message}");
                extract.errors.push(RowError { row, message });
            }
        }
    }
    log::debug!(
        "read CBS extract: {} rows, {} errors",
        extract.rows.len(),
        extract.errors.len()
    );
    Ok(extract)
}

fn cbs_row(
    row: usize,
    record: &StringRecord,
    account_col: Option<usize>,
    balance_col: Option<usize>,
    date_col: Option<usize>,
    product_col: Option<usize>,
    amount_col: Option<usize>,
) -> Result<CbsRow, String> {
    let account_number = field(record, account_col)
        .ok_or_else(|| "missing account number".to_string())?
        .to_string();
    let balance = match field(record, balance_col) {
        Some(raw) => parse_amount(raw).ok_or_else(|| format!("unparseable balance '{raw}'"))?,
        None => 0.0,
    };
    // Extracts without a transaction amount report the balance as the movement.
    let amount = match field(record, amount_col) {
        Some(raw) => parse_amount(raw).ok_or_else(|| format!("unparseable amount '{raw}'"))?,
        None => balance,
    };
    let transaction_date = match field(record, date_col) {
        Some(raw) => Some(parse_date(raw).ok_or_else(|| format!("unparseable date '{raw}'"))?),
        None => None,
    };
    Ok(CbsRow {
        row,
        account_number,
        balance,
        transaction_date,
        product: field(record, product_col).map(str::to_string),
        amount,
    })
}

/// Read a baseline import file into raw records. Rows that are not valid
/// UTF-8 are reported in `errors`; everything else is validated at import.
pub fn read_baseline_records<R: Read>(reader: R) -> PmsResult<BaselineFile> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let id_col = column(&headers, BASELINE_ID_ALIASES);
    let balance_col = column(&headers, BASELINE_BALANCE_ALIASES);
    let number_col = column(&headers, BASELINE_NUMBER_ALIASES);
    let branch_col = column(&headers, BASELINE_BRANCH_ALIASES);

    let mut file = BaselineFile::default();
    for (idx, record) in csv_reader.byte_records().enumerate() {
        let row = idx + 1;
        let record = match decode(row, record?) {
            Ok(record) => record,
            Err(error) => {
                log::warn!("baseline row {row} skipped: {}", error.message);
                file.errors.push(error);
                continue;
            }
        };
        file.records.push(BaselineRecord {
            row,
            account_id: field(&record, id_col).unwrap_or_default().to_string(),
            june_balance: field(&record, balance_col).unwrap_or_default().to_string(),
            account_number: field(&record, number_col).map(str::to_string),
            branch_code: field(&record, branch_col).map(str::to_string),
        });
    }
    Ok(file)
}

/// Text view of a raw row; a row with bad encoding is a row error.
fn decode(row: usize, record: ByteRecord) -> Result<StringRecord, RowError> {
    StringRecord::from_byte_record(record).map_err(|err| RowError {
        row,
        message: format!("row is not valid UTF-8 ({err})"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_aliases_resolve_to_canonical_fields() {
        let data = "Account No,Closing Balance,Txn Date,Product Name,Transaction Amount\n\
                    A1,\"1,200.50\",2025-12-01,Regular Savings,200\n";
        let extract = read_cbs_extract(data.as_bytes()).unwrap();
        assert!(extract.errors.is_empty());
        let row = &extract.rows[0];
        assert_eq!(row.account_number, "A1");
        assert_eq!(row.balance, 1200.5);
        assert_eq!(row.amount, 200.0);
        assert_eq!(row.transaction_date, NaiveDate::from_ymd_opt(2025, 12, 1));
        assert_eq!(row.product.as_deref(), Some("Regular Savings"));
    }

    #[test]
    fn malformed_rows_are_collected_not_fatal() {
        let data = "account_number,balance,amount\n,100,100\nA2,abc,5\nA3,700,\n";
        let extract = read_cbs_extract(data.as_bytes()).unwrap();
        assert_eq!(extract.errors.len(), 2);
        assert_eq!(extract.errors[0].row, 1);
        assert_eq!(extract.rows.len(), 1);
        // Empty amount falls back to the balance.
        assert_eq!(extract.rows[0].amount, 700.0);
    }

    #[test]
    fn parses_common_money_and_date_forms() {
        assert_eq!(parse_amount("(1,000.00)"), Some(-1000.0));
        assert_eq!(parse_amount("ETB 2,500"), Some(2500.0));
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(parse_amount("Br. 1,000"), Some(1000.0));
        assert_eq!(parse_amount("$12.50"), Some(12.5));
        assert_eq!(parse_amount("1,500 ETB"), Some(1500.0));
        assert_eq!(parse_amount(".75"), Some(0.75));
        assert_eq!(parse_date("05/12/2025"), NaiveDate::from_ymd_opt(2025, 12, 5));
        assert_eq!(parse_date("05-Dec-2025"), NaiveDate::from_ymd_opt(2025, 12, 5));
    }

    #[test]
    fn ambiguous_amounts_are_unreadable() {
        assert_eq!(parse_amount("1.000.50"), None);
        assert_eq!(parse_amount("12 34x5"), None);
        assert_eq!(parse_amount("Br."), None);
    }

    #[test]
    fn baseline_records_keep_raw_values() {
        let data = "account_id,june_balance,account_number,branch_code\nX1,3000,A1,BR1\nX2,,,\n";
        let records = read_baseline_records(data.as_bytes()).unwrap().records;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].account_number.as_deref(), Some("A1"));
        assert_eq!(records[1].june_balance, "");
    }

    #[test]
    fn rows_with_bad_encoding_are_collected_not_fatal() {
        let mut data = b"account_number,balance,amount\nA1,100,100\nA".to_vec();
        data.push(0xff);
        data.extend_from_slice(b"2,200,200\nA3,300,300\n");

        let extract = read_cbs_extract(data.as_slice()).unwrap();
        assert_eq!(extract.rows.len(), 2);
        assert_eq!(extract.rows[1].account_number, "A3");
        assert_eq!(extract.errors.len(), 1);
        assert_eq!(extract.errors[0].row, 2);

        let mut baseline = b"account_id,june_balance\nX1,10\nX".to_vec();
        baseline.push(0xff);
        baseline.extend_from_slice(b"2,20\n");
        let file = read_baseline_records(baseline.as_slice()).unwrap();
        assert_eq!(file.records.len(), 1);
        assert_eq!(file.errors.len(), 1);
        assert_eq!(file.errors[0].row, 2);
    }
}
