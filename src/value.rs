//! Text-protocol value decoding: each column's raw bytes, decoded according
//! to its [`ColumnType`] and (for string types) the connection's charset and
//! `use_unicode` setting. The teacher's `src/value.rs` decodes the *binary*
//! protocol's fixed-width/length-encoded wire values; this module decodes
//! decimal-text values instead, per spec.md's text-protocol decoder table.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::charset::decode as decode_charset;
use crate::col::FieldDescriptor;
use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Decimal(rust_decimal::Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(TimeDelta),
}

fn ascii_text(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes)
        .map_err(|e| Error::PacketRead(format!("non-UTF-8 numeric/temporal field text: {e}")))
}

fn parse_int(bytes: &[u8], unsigned: bool) -> Result<Value> {
    let text = ascii_text(bytes)?;
    if unsigned {
        text.parse::<u64>()
            .map(Value::UInt)
            .map_err(|e| Error::PacketRead(format!("invalid integer '{text}': {e}")))
    } else {
        text.parse::<i64>()
            .map(Value::Int)
            .map_err(|e| Error::PacketRead(format!("invalid integer '{text}': {e}")))
    }
}

fn parse_date(text: &str) -> Result<Value> {
    if text == "0000-00-00" {
        return Ok(Value::Null);
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(Value::Date)
        .map_err(|e| Error::PacketRead(format!("invalid date '{text}': {e}")))
}

fn parse_datetime(text: &str) -> Result<Value> {
    if text.starts_with("0000-00-00") {
        return Ok(Value::Null);
    }
    let format = if text.contains('.') {
        "%Y-%m-%d %H:%M:%S%.f"
    } else {
        "%Y-%m-%d %H:%M:%S"
    };
    NaiveDateTime::parse_from_str(text, format)
        .map(Value::DateTime)
        .map_err(|e| Error::PacketRead(format!("invalid datetime '{text}': {e}")))
}

/// `[-]HHH:MM:SS[.ffffff]`, hours may exceed 24 (MySQL's TIME range is
/// `-838:59:59` to `838:59:59`).
fn parse_time(text: &str) -> Result<Value> {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let mut parts = rest.splitn(3, ':');
    let (hours, minutes, seconds) = (
        parts.next().unwrap_or_default(),
        parts.next().unwrap_or_default(),
        parts.next().unwrap_or_default(),
    );
    let hours: i64 = hours
        .parse()
        .map_err(|e| Error::PacketRead(format!("invalid TIME '{text}': {e}")))?;
    let minutes: i64 = minutes
        .parse()
        .map_err(|e| Error::PacketRead(format!("invalid TIME '{text}': {e}")))?;
    let (seconds_part, fraction) = seconds.split_once('.').unwrap_or((seconds, "0"));
    let seconds: i64 = seconds_part
        .parse()
        .map_err(|e| Error::PacketRead(format!("invalid TIME '{text}': {e}")))?;
    let micros: i64 = format!("{fraction:0<6}")
        .get(..6)
        .unwrap_or("0")
        .parse()
        .unwrap_or(0);

    let magnitude = TimeDelta::hours(hours)
        + TimeDelta::minutes(minutes)
        + TimeDelta::seconds(seconds)
        + TimeDelta::microseconds(micros);
    Ok(Value::Time(if negative { -magnitude } else { magnitude }))
}

fn parse_decimal(text: &str) -> Value {
    match text.parse::<rust_decimal::Decimal>() {
        Ok(decimal) => Value::Decimal(decimal),
        // Out-of-range precision/scale: fall back to the raw text rather
        // than losing the value.
        Err(_) => Value::Text(text.to_string()),
    }
}

/// Decode one column's raw text-protocol bytes. `None` means the column was
/// NULL (the lenenc length-code sentinel).
pub fn decode(field: &FieldDescriptor, raw: Option<&[u8]>, use_unicode: bool) -> Result<Value> {
    let Some(bytes) = raw else {
        return Ok(Value::Null);
    };
    let unsigned = field.flags.contains(ColumnFlags::UNSIGNED_FLAG);

    match field.column_type {
        ColumnType::MYSQL_TYPE_NULL => Ok(Value::Null),

        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_YEAR
        | ColumnType::MYSQL_TYPE_LONGLONG => parse_int(bytes, unsigned),

        ColumnType::MYSQL_TYPE_FLOAT => {
            let text = ascii_text(bytes)?;
            text.parse::<f32>()
                .map(Value::Float)
                .map_err(|e| Error::PacketRead(format!("invalid float '{text}': {e}")))
        }
        ColumnType::MYSQL_TYPE_DOUBLE => {
            let text = ascii_text(bytes)?;
            text.parse::<f64>()
                .map(Value::Double)
                .map_err(|e| Error::PacketRead(format!("invalid double '{text}': {e}")))
        }

        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            Ok(parse_decimal(ascii_text(bytes)?))
        }

        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => {
            parse_date(ascii_text(bytes)?)
        }
        ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_DATETIME2
        | ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_TIMESTAMP2 => parse_datetime(ascii_text(bytes)?),
        ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => {
            parse_time(ascii_text(bytes)?)
        }

        ColumnType::MYSQL_TYPE_STRING
        | ColumnType::MYSQL_TYPE_VAR_STRING
        | ColumnType::MYSQL_TYPE_VARCHAR
        | ColumnType::MYSQL_TYPE_ENUM
        | ColumnType::MYSQL_TYPE_SET => {
            if use_unicode {
                Ok(Value::Text(decode_charset(field.charset, bytes)))
            } else {
                Ok(Value::Bytes(bytes.to_vec()))
            }
        }

        ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_GEOMETRY
        | ColumnType::MYSQL_TYPE_JSON
        | ColumnType::MYSQL_TYPE_BIT
        | ColumnType::MYSQL_TYPE_TYPED_ARRAY => Ok(Value::Bytes(bytes.to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(column_type: ColumnType, flags: ColumnFlags, charset: u16) -> FieldDescriptor {
        FieldDescriptor {
            catalog: "def".into(),
            schema: "test".into(),
            table: "t".into(),
            org_table: "t".into(),
            name: "c".into(),
            org_name: "c".into(),
            charset,
            column_length: 0,
            column_type,
            flags,
            decimals: 0,
        }
    }

    #[test]
    fn decodes_a_null_sentinel_regardless_of_type() {
        let f = field(ColumnType::MYSQL_TYPE_LONG, ColumnFlags::empty(), 33);
        assert_eq!(decode(&f, None, true).unwrap(), Value::Null);
    }

    #[test]
    fn decodes_signed_and_unsigned_integers() {
        let signed = field(ColumnType::MYSQL_TYPE_LONG, ColumnFlags::empty(), 33);
        assert_eq!(decode(&signed, Some(b"-7"), true).unwrap(), Value::Int(-7));

        let unsigned = field(
            ColumnType::MYSQL_TYPE_LONGLONG,
            ColumnFlags::UNSIGNED_FLAG,
            33,
        );
        assert_eq!(
            decode(&unsigned, Some(b"18446744073709551615"), true).unwrap(),
            Value::UInt(u64::MAX)
        );
    }

    #[test]
    fn decodes_a_decimal_with_rust_decimal() {
        let f = field(ColumnType::MYSQL_TYPE_NEWDECIMAL, ColumnFlags::empty(), 33);
        let value = decode(&f, Some(b"123.450"), true).unwrap();
        assert_eq!(value, Value::Decimal("123.450".parse().unwrap()));
    }

    #[test]
    fn zero_date_decodes_as_null() {
        let f = field(ColumnType::MYSQL_TYPE_DATE, ColumnFlags::empty(), 33);
        assert_eq!(decode(&f, Some(b"0000-00-00"), true).unwrap(), Value::Null);
    }

    #[test]
    fn zero_datetime_decodes_as_null() {
        let f = field(ColumnType::MYSQL_TYPE_DATETIME, ColumnFlags::empty(), 33);
        assert_eq!(
            decode(&f, Some(b"0000-00-00 00:00:00"), true).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn decodes_a_valid_date() {
        let f = field(ColumnType::MYSQL_TYPE_DATE, ColumnFlags::empty(), 33);
        let value = decode(&f, Some(b"2024-03-15"), true).unwrap();
        assert_eq!(value, Value::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()));
    }

    #[test]
    fn decodes_a_negative_time_past_24_hours() {
        let f = field(ColumnType::MYSQL_TYPE_TIME, ColumnFlags::empty(), 33);
        let value = decode(&f, Some(b"-100:30:15"), true).unwrap();
        let expected = -(TimeDelta::hours(100) + TimeDelta::minutes(30) + TimeDelta::seconds(15));
        assert_eq!(value, Value::Time(expected));
    }

    #[test]
    fn text_types_respect_use_unicode() {
        let f = field(ColumnType::MYSQL_TYPE_VAR_STRING, ColumnFlags::empty(), 33);
        assert_eq!(
            decode(&f, Some("caf\u{e9}".as_bytes()), true).unwrap(),
            Value::Text("café".into())
        );
        assert_eq!(
            decode(&f, Some(b"plain"), false).unwrap(),
            Value::Bytes(b"plain".to_vec())
        );
    }

    #[test]
    fn blobs_are_always_raw_bytes_even_with_use_unicode() {
        let f = field(ColumnType::MYSQL_TYPE_BLOB, ColumnFlags::empty(), 33);
        assert_eq!(
            decode(&f, Some(b"\x00\x01\x02"), true).unwrap(),
            Value::Bytes(vec![0, 1, 2])
        );
    }
}
