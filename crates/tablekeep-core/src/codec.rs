// ABOUTME: Value codec converting typed rows to and from CSV interchange text.
// ABOUTME: Decoding is driven by the column list so integers, timestamps and booleans survive intact.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use thiserror::Error;

use crate::table::{Column, ColumnKind, Row};
use crate::value::{BigInteger, Value};

/// Errors raised when rows cannot be encoded or decoded.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("table has no columns")]
    NoColumns,

    #[error("row {row} has {found} values but the table has {expected} columns")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("column {column:?} ({data_type}) cannot hold a {found} value at row {row}")]
    TypeMismatch {
        row: usize,
        column: String,
        data_type: String,
        found: &'static str,
    },

    #[error("column {column:?} holds a value of unsupported type {type_name} at row {row}")]
    Unsupported {
        row: usize,
        column: String,
        type_name: String,
    },

    #[error("header mismatch: expected {expected:?}, found {found:?}")]
    HeaderMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("invalid {kind} value {value:?} in column {column:?} at row {row}")]
    InvalidField {
        row: usize,
        column: String,
        kind: &'static str,
        value: String,
    },

    #[error("interchange text is not valid utf-8")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Encode rows as CSV: one header line of column names, then one line per row.
/// Every line, including the header of an empty table, ends with '\n'.
pub fn encode_rows(columns: &[Column], rows: &[Row]) -> Result<String, CodecError> {
    if columns.is_empty() {
        return Err(CodecError::NoColumns);
    }

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(columns.iter().map(|c| c.name.as_str()))?;

    let kinds: Vec<ColumnKind> = columns.iter().map(Column::kind).collect();
    let mut fields: Vec<String> = Vec::with_capacity(columns.len());
    for (row_idx, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(CodecError::RowWidth {
                row: row_idx,
                expected: columns.len(),
                found: row.len(),
            });
        }
        fields.clear();
        for ((column, kind), value) in columns.iter().zip(&kinds).zip(row) {
            fields.push(encode_value(row_idx, column, *kind, value)?);
        }
        writer.write_record(&fields)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CodecError::Csv(csv::Error::from(e.into_error())))?;
    String::from_utf8(bytes).map_err(|e| CodecError::Utf8(e.utf8_error()))
}

/// Render one value as an unquoted field. Quoting is left to the CSV writer.
fn encode_value(
    row: usize,
    column: &Column,
    kind: ColumnKind,
    value: &Value,
) -> Result<String, CodecError> {
    let mismatch = || CodecError::TypeMismatch {
        row,
        column: column.name.clone(),
        data_type: column.data_type.clone(),
        found: value.variant_name(),
    };

    match (kind, value) {
        (_, Value::Null) => Ok(String::new()),
        (_, Value::Unsupported { type_name }) => Err(CodecError::Unsupported {
            row,
            column: column.name.clone(),
            type_name: type_name.clone(),
        }),
        (ColumnKind::Boolean | ColumnKind::Text, Value::Bool(b)) => Ok(b.to_string()),
        (ColumnKind::Integer | ColumnKind::Float | ColumnKind::Text, Value::Integer(i)) => {
            Ok(i.to_string())
        }
        // Debug formatting always carries '.', 'e', "inf" or "NaN", so a float
        // field is never mistaken for an integer literal.
        (ColumnKind::Float | ColumnKind::Text, Value::Float(f)) => Ok(format!("{:?}", f)),
        (ColumnKind::Timestamp | ColumnKind::Text, Value::Timestamp(ts)) => {
            Ok(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        (ColumnKind::Text, Value::Text(s)) => Ok(s.clone()),
        // Float columns may carry oversized integers widened to text on decode.
        (ColumnKind::Float, Value::Text(s))
            if s
                .parse::<BigInteger>()
                .is_ok_and(|i| !i.fits_f64_exactly()) =>
        {
            Ok(s.clone())
        }
        _ => Err(mismatch()),
    }
}

/// Decode CSV produced by [`encode_rows`] back into rows for `columns`.
/// The header must name exactly these columns, in order.
pub fn decode_rows(columns: &[Column], text: &str) -> Result<Vec<Row>, CodecError> {
    if columns.is_empty() {
        return Err(CodecError::NoColumns);
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(text.as_bytes());

    let found: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let expected: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    if found != expected {
        return Err(CodecError::HeaderMismatch { expected, found });
    }

    let kinds: Vec<ColumnKind> = columns.iter().map(Column::kind).collect();
    let mut rows = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        let mut row = Vec::with_capacity(columns.len());
        for ((column, kind), field) in columns.iter().zip(&kinds).zip(record.iter()) {
            row.push(decode_field(row_idx, column, *kind, field)?);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Read only the header line of CSV interchange text.
pub fn read_header(text: &str) -> Result<Vec<String>, CodecError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());
    Ok(reader.headers()?.iter().map(str::to_string).collect())
}

fn decode_field(
    row: usize,
    column: &Column,
    kind: ColumnKind,
    field: &str,
) -> Result<Value, CodecError> {
    if field.is_empty() {
        return Ok(Value::Null);
    }

    let invalid = |expected: &'static str| CodecError::InvalidField {
        row,
        column: column.name.clone(),
        kind: expected,
        value: field.to_string(),
    };

    match kind {
        ColumnKind::Text => Ok(Value::Text(field.to_string())),
        ColumnKind::Boolean => match field {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(invalid("boolean")),
        },
        ColumnKind::Integer => field
            .parse::<BigInteger>()
            .map(Value::Integer)
            .map_err(|_| invalid("integer")),
        ColumnKind::Float => {
            // An integer literal an f64 cannot hold exactly widens to text.
            if let Ok(int) = field.parse::<BigInteger>()
                && !int.fits_f64_exactly()
            {
                return Ok(Value::Text(field.to_string()));
            }
            field
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| invalid("float"))
        }
        ColumnKind::Timestamp => parse_timestamp(field)
            .map(Value::Timestamp)
            .ok_or_else(|| invalid("timestamp")),
    }
}

/// Accept RFC 3339, naive date-times (read as UTC), and bare dates (midnight UTC).
/// Years outside 0000..=9999 carry an explicit sign, as `encode_rows` writes them.
fn parse_timestamp(field: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(field) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive_part = field.strip_suffix('Z').unwrap_or(field);
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_part, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(field, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cols(defs: &[(&str, &str)]) -> Vec<Column> {
        defs.iter().map(|(n, t)| Column::new(*n, *t)).collect()
    }

    #[test]
    fn quotes_fields_containing_the_delimiter() {
        let columns = cols(&[("city", "VARCHAR")]);
        let rows = vec![vec![Value::from("San Francisco, CA")]];

        let text = encode_rows(&columns, &rows).unwrap();
        assert_eq!(text, "city\n\"San Francisco, CA\"\n");
    }

    #[test]
    fn doubles_internal_quotes_and_keeps_line_breaks() {
        let columns = cols(&[("note", "VARCHAR")]);
        let rows = vec![vec![Value::from("she said \"hi\"\nthen left")]];

        let text = encode_rows(&columns, &rows).unwrap();
        assert_eq!(text, "note\n\"she said \"\"hi\"\"\nthen left\"\n");
        assert_eq!(decode_rows(&columns, &text).unwrap(), rows);
    }

    #[test]
    fn escapes_column_names_like_values() {
        let columns = cols(&[("a,b", "VARCHAR"), ("plain", "VARCHAR")]);
        let text = encode_rows(&columns, &[]).unwrap();
        assert_eq!(text, "\"a,b\",plain\n");
        assert_eq!(read_header(&text).unwrap(), vec!["a,b", "plain"]);
    }

    #[test]
    fn empty_table_is_header_only_with_terminator() {
        let columns = cols(&[("id", "BIGINT"), ("name", "VARCHAR")]);
        let text = encode_rows(&columns, &[]).unwrap();
        assert_eq!(text, "id,name\n");
        assert!(decode_rows(&columns, &text).unwrap().is_empty());
    }

    #[test]
    fn round_trips_every_value_kind() {
        let columns = cols(&[
            ("id", "HUGEINT"),
            ("ratio", "DOUBLE"),
            ("active", "BOOLEAN"),
            ("seen_at", "TIMESTAMP"),
            ("label", "VARCHAR"),
        ]);
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 58).unwrap()
            + chrono::Duration::milliseconds(123);
        let rows = vec![
            vec![
                Value::Integer("123456789012345678901234567890".parse().unwrap()),
                Value::Float(0.1),
                Value::Bool(true),
                Value::Timestamp(ts),
                Value::from("plain"),
            ],
            vec![
                Value::from(-9_223_372_036_854_775_808_i64),
                Value::Float(-1.5e-300),
                Value::Bool(false),
                Value::Null,
                Value::from("with \"quotes\", commas\r\nand breaks"),
            ],
            vec![Value::Null, Value::Null, Value::Null, Value::Null, Value::Null],
        ];

        let text = encode_rows(&columns, &rows).unwrap();
        assert!(text.contains("123456789012345678901234567890"));
        assert!(text.contains("2024-02-29T23:59:58.123Z"));
        assert_eq!(decode_rows(&columns, &text).unwrap(), rows);
    }

    #[test]
    fn single_null_column_row_survives() {
        let columns = cols(&[("only", "VARCHAR")]);
        let rows = vec![vec![Value::Null], vec![Value::from("x")]];
        let text = encode_rows(&columns, &rows).unwrap();
        assert_eq!(decode_rows(&columns, &text).unwrap(), rows);
    }

    #[test]
    fn empty_text_widens_to_null() {
        let columns = cols(&[("a", "VARCHAR"), ("b", "VARCHAR")]);
        let rows = vec![vec![Value::from(""), Value::from("x")]];
        let text = encode_rows(&columns, &rows).unwrap();
        let decoded = decode_rows(&columns, &text).unwrap();
        assert_eq!(decoded, vec![vec![Value::Null, Value::from("x")]]);
    }

    #[test]
    fn oversized_integer_in_float_column_decodes_as_equal_text() {
        let columns = cols(&[("amount", "DOUBLE")]);
        let rows = vec![vec![Value::from(9_007_199_254_740_993_i64)]];

        let text = encode_rows(&columns, &rows).unwrap();
        assert_eq!(text, "amount\n9007199254740993\n");

        let decoded = decode_rows(&columns, &text).unwrap();
        assert_eq!(decoded, vec![vec![Value::from("9007199254740993")]]);

        // The widened text re-encodes to the same digits.
        assert_eq!(encode_rows(&columns, &decoded).unwrap(), text);
    }

    #[test]
    fn safe_integer_in_float_column_decodes_as_float() {
        let columns = cols(&[("amount", "DOUBLE")]);
        let text = "amount\n42\n";
        assert_eq!(
            decode_rows(&columns, text).unwrap(),
            vec![vec![Value::Float(42.0)]]
        );
    }

    #[test]
    fn integer_text_that_fits_a_float_column_is_rejected() {
        let columns = cols(&[("amount", "DOUBLE")]);
        let err = encode_rows(&columns, &[vec![Value::from("42")]]).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { found: "text", .. }));
    }

    #[test]
    fn large_integral_floats_stay_floats() {
        let columns = cols(&[("x", "DOUBLE")]);
        let rows = vec![vec![Value::Float(1e17)], vec![Value::Float(42.0)]];
        let text = encode_rows(&columns, &rows).unwrap();
        assert_eq!(text, "x\n1e17\n42.0\n");
        assert_eq!(decode_rows(&columns, &text).unwrap(), rows);
    }

    #[test]
    fn booleans_are_case_sensitive() {
        let columns = cols(&[("flag", "BOOLEAN")]);
        let err = decode_rows(&columns, "flag\nTrue\n").unwrap_err();
        assert!(matches!(err, CodecError::InvalidField { kind: "boolean", .. }));
    }

    #[test]
    fn timestamps_truncate_to_milliseconds() {
        let columns = cols(&[("at", "TIMESTAMP")]);
        let precise = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(1_234_567);
        let text = encode_rows(&columns, &[vec![Value::Timestamp(precise)]]).unwrap();
        assert_eq!(text, "at\n2023-01-01T00:00:00.001Z\n");
    }

    #[test]
    fn timestamps_beyond_four_digit_years_round_trip() {
        let columns = cols(&[("at", "TIMESTAMP")]);
        let far = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();
        let ancient = Utc.with_ymd_and_hms(-44, 3, 15, 12, 0, 0).unwrap()
            + chrono::Duration::milliseconds(250);
        let rows = vec![vec![Value::Timestamp(far)], vec![Value::Timestamp(ancient)]];

        let text = encode_rows(&columns, &rows).unwrap();
        assert_eq!(
            text,
            "at\n+10000-01-01T00:00:00.000Z\n-0044-03-15T12:00:00.250Z\n"
        );
        assert_eq!(decode_rows(&columns, &text).unwrap(), rows);
    }

    #[test]
    fn accepts_dates_and_naive_timestamps() {
        let columns = cols(&[("d", "DATE"), ("t", "TIMESTAMP")]);
        let rows = decode_rows(&columns, "d,t\n2020-05-06,2020-05-06 07:08:09.5\n").unwrap();
        assert_eq!(
            rows[0][0],
            Value::Timestamp(Utc.with_ymd_and_hms(2020, 5, 6, 0, 0, 0).unwrap())
        );
        assert_eq!(
            rows[0][1],
            Value::Timestamp(
                Utc.with_ymd_and_hms(2020, 5, 6, 7, 8, 9).unwrap()
                    + chrono::Duration::milliseconds(500)
            )
        );
    }

    #[test]
    fn unsupported_values_are_serialization_errors() {
        let columns = cols(&[("blob", "BLOB")]);
        let rows = vec![vec![Value::Unsupported {
            type_name: "BLOB".to_string(),
        }]];
        let err = encode_rows(&columns, &rows).unwrap_err();
        assert!(matches!(err, CodecError::Unsupported { ref column, .. } if column == "blob"));
    }

    #[test]
    fn mismatched_variant_is_rejected() {
        let columns = cols(&[("id", "BIGINT")]);
        let err = encode_rows(&columns, &[vec![Value::from("abc")]]).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { found: "text", .. }));
    }

    #[test]
    fn row_width_is_checked() {
        let columns = cols(&[("a", "BIGINT"), ("b", "BIGINT")]);
        let err = encode_rows(&columns, &[vec![Value::from(1i64)]]).unwrap_err();
        assert!(matches!(err, CodecError::RowWidth { expected: 2, found: 1, .. }));
    }

    #[test]
    fn header_must_match_columns() {
        let columns = cols(&[("a", "BIGINT"), ("b", "BIGINT")]);
        let err = decode_rows(&columns, "b,a\n1,2\n").unwrap_err();
        assert!(matches!(err, CodecError::HeaderMismatch { .. }));
    }

    #[test]
    fn ragged_records_fail_to_decode() {
        let columns = cols(&[("a", "BIGINT"), ("b", "BIGINT")]);
        assert!(decode_rows(&columns, "a,b\n1\n").is_err());
    }
}
