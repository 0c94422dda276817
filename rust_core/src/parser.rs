//! Record parsing
//!
//! Turns one delimited row into a validated [`Transaction`]. Column layout:
//! - 0: project id (copied verbatim)
//! - 1: timestamp, `YYYY-MM-DD HH:MM:SS.mmm`
//! - 14: JSON object carrying `currencySymbol`
//! - 15: JSON object carrying `currencyValueDecimal`
//!
//! Other columns are ignored.

use crate::error::{ParseError, ParseErrorKind};
use crate::models::{fixed_timestamp, Transaction};
use csv::{ReaderBuilder, StringRecord};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::value::RawValue;
use std::io::Read;

pub const PROJECT_ID_FIELD: usize = 0;
pub const TIMESTAMP_FIELD: usize = 1;
pub const SYMBOL_FIELD: usize = 14;
pub const AMOUNT_FIELD: usize = 15;
pub const MIN_FIELDS: usize = 16;

#[derive(Debug, Deserialize)]
struct SymbolField {
    #[serde(rename = "currencySymbol")]
    currency_symbol: String,
}

#[derive(Debug, Deserialize)]
struct AmountField {
    #[serde(rename = "currencyValueDecimal")]
    currency_value_decimal: Box<RawValue>,
}

/// Decode an amount from its raw JSON text, either a string or a number.
///
/// Works on the literal digits so no value passes through `f64`. Amounts
/// that `Decimal` cannot hold exactly are rejected, never rounded.
fn decode_amount(raw: &RawValue) -> Result<Decimal, String> {
    let text = raw.get().trim();
    let literal = if text.starts_with('"') {
        serde_json::from_str::<String>(text).map_err(|e| e.to_string())?
    } else {
        text.to_string()
    };
    let literal = literal.trim();

    let decoded = if literal.contains(|c: char| c == 'e' || c == 'E') {
        Decimal::from_scientific(literal)
    } else {
        Decimal::from_str_exact(literal)
    };
    decoded.map_err(|e| format!("'{}': {}", literal, e))
}

/// Parse an ordered sequence of fields into a transaction.
pub fn parse_fields<S: AsRef<str>>(fields: &[S]) -> Result<Transaction, ParseError> {
    if fields.len() < MIN_FIELDS {
        return Err(ParseError::new(
            ParseErrorKind::TooFewFields,
            format!("expected at least {} fields, got {}", MIN_FIELDS, fields.len()),
        ));
    }

    let raw_ts = fields[TIMESTAMP_FIELD].as_ref();
    let timestamp = fixed_timestamp::parse(raw_ts).map_err(|e| {
        ParseError::new(
            ParseErrorKind::InvalidTimestamp,
            format!("'{}': {}", raw_ts, e),
        )
    })?;

    let symbol: SymbolField = serde_json::from_str(fields[SYMBOL_FIELD].as_ref())
        .map_err(|e| ParseError::new(ParseErrorKind::InvalidSymbolField, e.to_string()))?;

    let amount: AmountField = serde_json::from_str(fields[AMOUNT_FIELD].as_ref())
        .map_err(|e| ParseError::new(ParseErrorKind::InvalidAmountField, e.to_string()))?;
    let amount = decode_amount(&amount.currency_value_decimal)
        .map_err(|e| ParseError::new(ParseErrorKind::InvalidAmountField, e))?;

    Ok(Transaction::new(
        timestamp,
        fields[PROJECT_ID_FIELD].as_ref(),
        symbol.currency_symbol,
        amount,
    ))
}

pub fn parse_record(record: &StringRecord) -> Result<Transaction, ParseError> {
    let fields: Vec<&str> = record.iter().collect();
    parse_fields(&fields)
}

/// One data row as read from the input, tagged with its 1-based line.
///
/// `record` is already a `MalformedRow` failure when the CSV layer could not
/// decode the row, so the row policy applies to it like any parse failure.
#[derive(Debug)]
pub struct RawRow {
    pub line: u64,
    pub record: Result<StringRecord, ParseError>,
}

impl RawRow {
    pub fn parse(&self) -> Result<Transaction, ParseError> {
        match &self.record {
            Ok(record) => parse_record(record),
            Err(e) => Err(e.clone()),
        }
    }
}

/// Pulls data rows one at a time from a byte stream, discarding the header.
///
/// Only I/O failures of the underlying stream are yielded as `Err`.
pub struct RowReader<R: Read> {
    inner: csv::Reader<R>,
    header_read: bool,
    done: bool,
}

impl<R: Read> RowReader<R> {
    pub fn new(input: R) -> Self {
        let inner = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);
        Self {
            inner,
            header_read: false,
            done: false,
        }
    }
}

impl<R: Read> Iterator for RowReader<R> {
    type Item = Result<RawRow, csv::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        // Consume the header up front so the position below is the data row's
        if !self.header_read {
            self.header_read = true;
            if let Err(e) = self.inner.byte_headers() {
                if e.is_io_error() {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        // csv errors carry a stale position; take the row's start line here
        let start_line = self.inner.position().line();

        let mut record = StringRecord::new();
        match self.inner.read_record(&mut record) {
            Ok(true) => {
                let line = record.position().map(|p| p.line()).unwrap_or(start_line);
                Some(Ok(RawRow {
                    line,
                    record: Ok(record),
                }))
            }
            Ok(false) => {
                self.done = true;
                None
            }
            Err(e) if e.is_io_error() => {
                self.done = true;
                Some(Err(e))
            }
            Err(e) => {
                Some(Ok(RawRow {
                    line: start_line,
                    record: Err(ParseError::new(ParseErrorKind::MalformedRow, e.to_string())),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(ts: &str, symbol_json: &str, amount_json: &str) -> Vec<String> {
        let mut fields: Vec<String> = (0..MIN_FIELDS).map(|i| format!("f{}", i)).collect();
        fields[PROJECT_ID_FIELD] = "p1".to_string();
        fields[TIMESTAMP_FIELD] = ts.to_string();
        fields[SYMBOL_FIELD] = symbol_json.to_string();
        fields[AMOUNT_FIELD] = amount_json.to_string();
        fields
    }

    fn valid() -> Vec<String> {
        row(
            "2023-01-01 10:00:00.000",
            r#"{"currencySymbol":"BTC"}"#,
            r#"{"currencyValueDecimal":"2.5"}"#,
        )
    }

    #[test]
    fn test_parse_valid_row() {
        let tx = parse_fields(&valid()).unwrap();
        assert_eq!(tx.project_id, "p1");
        assert_eq!(tx.symbol, "BTC");
        assert_eq!(tx.amount, dec!(2.5));
        assert_eq!(tx.volume_quote, None);
        assert_eq!(
            tx.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            "2023-01-01 10:00:00.000"
        );
    }

    #[test]
    fn test_amount_is_exact() {
        let fields = row(
            "2023-01-01 10:00:00.000",
            r#"{"currencySymbol":"ETH"}"#,
            r#"{"currencyValueDecimal":"0.123456789012345678901234"}"#,
        );
        let tx = parse_fields(&fields).unwrap();
        assert_eq!(tx.amount, dec!(0.123456789012345678901234));
    }

    #[test]
    fn test_high_precision_json_number_is_exact() {
        let fields = row(
            "2023-01-01 10:00:00.000",
            r#"{"currencySymbol":"ETH"}"#,
            r#"{"currencyValueDecimal":2.123456789012345678}"#,
        );
        assert_eq!(
            parse_fields(&fields).unwrap().amount,
            dec!(2.123456789012345678)
        );
    }

    #[test]
    fn test_amount_rejects_unrepresentable_precision() {
        let fields = row(
            "2023-01-01 10:00:00.000",
            r#"{"currencySymbol":"ETH"}"#,
            r#"{"currencyValueDecimal":"0.1234567890123456789012345678901234"}"#,
        );
        assert_eq!(
            parse_fields(&fields).unwrap_err().kind,
            ParseErrorKind::InvalidAmountField
        );
    }

    #[test]
    fn test_amount_accepts_exponent() {
        let fields = row(
            "2023-01-01 10:00:00.000",
            r#"{"currencySymbol":"ETH"}"#,
            r#"{"currencyValueDecimal":1.5e3}"#,
        );
        assert_eq!(parse_fields(&fields).unwrap().amount, dec!(1500));
    }

    #[test]
    fn test_amount_accepts_json_number() {
        let fields = row(
            "2023-01-01 10:00:00.000",
            r#"{"currencySymbol":"ETH"}"#,
            r#"{"currencyValueDecimal":42}"#,
        );
        assert_eq!(parse_fields(&fields).unwrap().amount, dec!(42));
    }

    #[test]
    fn test_error_kinds() {
        let cases = [
            (
                row("01/01/2023", r#"{"currencySymbol":"BTC"}"#, r#"{"currencyValueDecimal":"1"}"#),
                ParseErrorKind::InvalidTimestamp,
            ),
            (
                row("2023-01-01 10:00:00.000", "not json", r#"{"currencyValueDecimal":"1"}"#),
                ParseErrorKind::InvalidSymbolField,
            ),
            (
                row("2023-01-01 10:00:00.000", r#"{"other":"BTC"}"#, r#"{"currencyValueDecimal":"1"}"#),
                ParseErrorKind::InvalidSymbolField,
            ),
            (
                row("2023-01-01 10:00:00.000", r#"{"currencySymbol":"BTC"}"#, r#"{"currencyValueDecimal":"abc"}"#),
                ParseErrorKind::InvalidAmountField,
            ),
            (
                row("2023-01-01 10:00:00.000", r#"{"currencySymbol":"BTC"}"#, "{}"),
                ParseErrorKind::InvalidAmountField,
            ),
            (
                row("2023-01-01 10:00:00.000", r#"{"currencySymbol":"BTC"}"#, r#"{"currencyValueDecimal":null}"#),
                ParseErrorKind::InvalidAmountField,
            ),
        ];

        for (fields, kind) in cases {
            let err = parse_fields(&fields).unwrap_err();
            assert_eq!(err.kind, kind, "unexpected kind for {:?}", fields);
        }
    }

    #[test]
    fn test_timestamp_checked_before_json_fields() {
        let fields = row("garbage", "garbage", "garbage");
        assert_eq!(
            parse_fields(&fields).unwrap_err().kind,
            ParseErrorKind::InvalidTimestamp
        );
    }

    #[test]
    fn test_short_row() {
        let err = parse_fields(&["p1", "2023-01-01 10:00:00.000"]).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TooFewFields);
    }

    #[test]
    fn test_row_reader_skips_header_and_tracks_lines() {
        let header = (0..MIN_FIELDS).map(|i| format!("h{}", i)).collect::<Vec<_>>().join(",");
        let good = "p1,2023-01-01 10:00:00.000,a,b,c,d,e,f,g,h,i,j,k,l,\"{\"\"currencySymbol\"\":\"\"BTC\"\"}\",\"{\"\"currencyValueDecimal\"\":\"\"2.5\"\"}\"";
        let short = "p2,2023-01-01 10:00:00.000";
        let input = format!("{}\n{}\n{}\n", header, good, short);

        let rows: Vec<RawRow> = RowReader::new(input.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].parse().unwrap().symbol, "BTC");
        assert_eq!(rows[1].line, 3);
        assert_eq!(rows[1].parse().unwrap_err().kind, ParseErrorKind::TooFewFields);
    }

    #[test]
    fn test_malformed_row_reports_its_own_line() {
        let good = "p1,2023-01-01 10:00:00.000,a,b,c,d,e,f,g,h,i,j,k,l,\"{\"\"currencySymbol\"\":\"\"BTC\"\"}\",\"{\"\"currencyValueDecimal\"\":\"\"1\"\"}\"";
        let mut input = b"h\np1,\xff\xfe,x\n".to_vec();
        input.extend_from_slice(good.as_bytes());
        input.push(b'\n');

        let rows: Vec<RawRow> = RowReader::new(input.as_slice())
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].parse().unwrap_err().kind, ParseErrorKind::MalformedRow);
        assert_eq!(rows[1].line, 3);
        assert_eq!(rows[1].parse().unwrap().symbol, "BTC");
    }
}
