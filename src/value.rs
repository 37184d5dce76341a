//! Column values and their wire encoding.
use time::{Date, Month, PrimitiveDateTime, Time};

use crate::{
    Result,
    gds::*,
    row::Field,
    wire::{WireStream, protocol},
};

/// A single column or parameter value.
///
/// Fixed point columns keep their raw integer and scale instead of a
/// lossy float. Blob and array columns fetch as ids until materialized
/// through segment or slice reads.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Binary(Vec<u8>),
    Integer { value: i64, scale: i32 },
    Float(f32),
    Double(f64),
    Date(Date),
    Time(Time),
    Timestamp(PrimitiveDateTime),
    /// Blob id, readable through [`Blob`][crate::blob::Blob].
    Blob(i64),
    /// Array id, readable through [`get_slice`][crate::array::get_slice].
    Array(i64),
    /// Array slice materialized into element values.
    ArrayData(Vec<SqlValue>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value, only when the scale is zero.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer { value, scale: 0 } => Some(*value),
            _ => None,
        }
    }

    /// Numeric value as a float, applying any fixed point scale.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Integer { value, scale } => {
                Some(*value as f64 * 10f64.powi(*scale))
            }
            SqlValue::Float(f) => Some(*f as f64),
            SqlValue::Double(d) => Some(*d),
            _ => None,
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Binary(b) => write!(f, "{} bytes", b.len()),
            SqlValue::Integer { value, scale } => f.write_str(&scaled_to_string(*value, *scale)),
            SqlValue::Float(v) => v.fmt(f),
            SqlValue::Double(v) => v.fmt(f),
            SqlValue::Date(v) => v.fmt(f),
            SqlValue::Time(v) => v.fmt(f),
            SqlValue::Timestamp(v) => v.fmt(f),
            SqlValue::Blob(id) => write!(f, "blob:{id}"),
            SqlValue::Array(id) => write!(f, "array:{id}"),
            SqlValue::ArrayData(items) => write!(f, "array of {}", items.len()),
        }
    }
}

/// Render a fixed point integer with its decimal point placed by `scale`.
pub fn scaled_to_string(value: i64, scale: i32) -> String {
    if scale >= 0 {
        let mut s = value.to_string();
        for _ in 0..scale {
            s.push('0');
        }
        return s;
    }
    let digits = (-scale) as usize;
    let negative = value < 0;
    let mut body = value.unsigned_abs().to_string();
    while body.len() <= digits {
        body.insert(0, '0');
    }
    body.insert(body.len() - digits, '.');
    if negative {
        body.insert(0, '-');
    }
    body
}

/// Move a raw fixed point integer from one scale to another.
///
/// Scaling down must be exact, a remainder is a protocol error rather
/// than silent truncation.
pub(crate) fn rescale(value: i64, from: i32, to: i32) -> Result<i64> {
    if from == to {
        return Ok(value);
    }
    if to < from {
        let factor = 10i64
            .checked_pow((from - to) as u32)
            .ok_or_else(|| protocol!("scale overflow from {from} to {to}"))?;
        return value
            .checked_mul(factor)
            .ok_or_else(|| protocol!("numeric overflow rescaling {value}").into());
    }
    let factor = 10i64
        .checked_pow((to - from) as u32)
        .ok_or_else(|| protocol!("scale overflow from {from} to {to}"))?;
    if value % factor != 0 {
        return Err(protocol!("{value} loses digits at scale {to}").into());
    }
    Ok(value / factor)
}

// The wire date is a modified Julian day number. Day zero is
// 1858-11-17, the fraction below is the classic Fliegel and Van
// Flandern conversion shifted by 1721119 - 2400001.

pub(crate) fn encode_date(date: Date) -> i32 {
    let day = date.day() as i32;
    let mut month = date.month() as i32;
    let mut year = date.year();

    if month > 2 {
        month -= 3;
    } else {
        month += 9;
        year -= 1;
    }

    let c = year / 100;
    let ya = year - 100 * c;

    (146097 * c) / 4 + (1461 * ya) / 4 + (153 * month + 2) / 5 + day + 1721119 - 2400001
}

pub(crate) fn decode_date(sql_date: i32) -> Result<Date> {
    let mut sql_date = sql_date - (1721119 - 2400001);
    let century = (4 * sql_date - 1) / 146097;
    sql_date = 4 * sql_date - 1 - 146097 * century;
    let mut day = sql_date / 4;

    sql_date = (4 * day + 3) / 1461;
    day = 4 * day + 3 - 1461 * sql_date;
    day = (day + 4) / 4;

    let mut month = (5 * day - 3) / 153;
    day = 5 * day - 3 - 153 * month;
    day = (day + 5) / 5;

    let mut year = 100 * century + sql_date;

    if month < 10 {
        month += 3;
    } else {
        month -= 9;
        year += 1;
    }

    let month = Month::try_from(month as u8)
        .map_err(|_| protocol!("invalid month in wire date"))?;
    Date::from_calendar_date(year, month, day as u8)
        .map_err(|e| protocol!("invalid wire date: {e}").into())
}

// The wire time is tenths of a millisecond since midnight.

pub(crate) fn encode_time(time: Time) -> i32 {
    let seconds_in_day = time.hour() as i64 * 60 * 60
        + time.minute() as i64 * 60
        + time.second() as i64;
    (seconds_in_day * 10_000 + time.microsecond() as i64 / 100) as i32
}

pub(crate) fn decode_time(sql_time: i32) -> Result<Time> {
    let seconds = sql_time / 10_000;
    let micros = (sql_time % 10_000) * 100;
    Time::from_hms_micro(
        (seconds / 3600) as u8,
        (seconds / 60 % 60) as u8,
        (seconds % 60) as u8,
        micros as u32,
    )
    .map_err(|e| protocol!("invalid wire time: {e}").into())
}

fn null_epoch() -> Date {
    // fix-up value for null temporal parameters
    Date::from_ordinal_date(1970, 1).unwrap()
}

/// Read one column of a data message, its value then its null indicator.
pub(crate) fn read_value(stream: &mut WireStream, field: &Field) -> Result<SqlValue> {
    let value = match field.sql_type() {
        SQL_TEXT => {
            let bytes = stream.read_opaque(field.length() as usize)?;
            SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        SQL_VARYING => {
            let len = stream.read_i32()?;
            if len < 0 {
                return Err(protocol!("negative varying length {len}").into());
            }
            let bytes = stream.read_opaque(len as usize)?;
            let text = String::from_utf8_lossy(&bytes);
            SqlValue::Text(text.trim_end().to_owned())
        }
        SQL_SHORT | SQL_LONG => SqlValue::Integer {
            value: stream.read_i32()? as i64,
            scale: field.scale(),
        },
        SQL_QUAD | SQL_INT64 => SqlValue::Integer {
            value: stream.read_i64()?,
            scale: field.scale(),
        },
        SQL_FLOAT => SqlValue::Float(stream.read_f32()?),
        SQL_DOUBLE | SQL_D_FLOAT => SqlValue::Double(stream.read_f64()?),
        SQL_TIMESTAMP => {
            let date = decode_date(stream.read_i32()?)?;
            let time = decode_time(stream.read_i32()?)?;
            SqlValue::Timestamp(PrimitiveDateTime::new(date, time))
        }
        SQL_TYPE_TIME => SqlValue::Time(decode_time(stream.read_i32()?)?),
        SQL_TYPE_DATE => SqlValue::Date(decode_date(stream.read_i32()?)?),
        SQL_BLOB => SqlValue::Blob(stream.read_i64()?),
        SQL_ARRAY => SqlValue::Array(stream.read_i64()?),
        other => return Err(protocol!("unknown sql data type {other}").into()),
    };

    match stream.read_i32()? {
        0 => Ok(value),
        -1 => Ok(SqlValue::Null),
        ind => Err(protocol!("invalid sqlind value: {ind}").into()),
    }
}

/// Write one parameter, its value then its null indicator.
///
/// Null parameters still carry a zero value of the declared type, only
/// the indicator says null.
pub(crate) fn write_value(stream: &mut WireStream, field: &Field, value: &SqlValue) -> Result<()> {
    let sqlind: i32 = if value.is_null() { -1 } else { 0 };

    match (field.sql_type(), value) {
        (SQL_TEXT, SqlValue::Null) => {
            stream.write_opaque(&vec![0u8; field.length() as usize], field.length() as usize);
        }
        (SQL_TEXT, SqlValue::Text(s)) => {
            stream.write_opaque(s.as_bytes(), field.length() as usize);
        }
        (SQL_TEXT, SqlValue::Binary(b)) => {
            stream.write_opaque(b, field.length() as usize);
        }
        (SQL_VARYING, SqlValue::Null) => {
            stream.write_i32(0);
        }
        (SQL_VARYING, SqlValue::Text(s)) => write_varying(stream, field, s.as_bytes())?,
        (SQL_VARYING, SqlValue::Binary(b)) => write_varying(stream, field, b)?,
        (SQL_SHORT | SQL_LONG, SqlValue::Null) => stream.write_i32(0),
        (SQL_SHORT | SQL_LONG, SqlValue::Integer { value, scale }) => {
            let raw = rescale(*value, *scale, field.scale())?;
            let raw = i32::try_from(raw)
                .map_err(|_| protocol!("{raw} out of range for integer column"))?;
            stream.write_i32(raw);
        }
        (SQL_INT64 | SQL_QUAD, SqlValue::Null) => stream.write_i64(0),
        (SQL_INT64 | SQL_QUAD, SqlValue::Integer { value, scale }) => {
            stream.write_i64(rescale(*value, *scale, field.scale())?);
        }
        (SQL_FLOAT, SqlValue::Null) => stream.write_f32(0.0),
        (SQL_FLOAT, SqlValue::Float(v)) => stream.write_f32(*v),
        (SQL_DOUBLE | SQL_D_FLOAT, SqlValue::Null) => stream.write_f64(0.0),
        (SQL_DOUBLE | SQL_D_FLOAT, SqlValue::Double(v)) => stream.write_f64(*v),
        (SQL_DOUBLE | SQL_D_FLOAT, SqlValue::Float(v)) => stream.write_f64(*v as f64),
        (SQL_TIMESTAMP, SqlValue::Null) => {
            stream.write_i32(encode_date(null_epoch()));
            stream.write_i32(0);
        }
        (SQL_TIMESTAMP, SqlValue::Timestamp(ts)) => {
            stream.write_i32(encode_date(ts.date()));
            stream.write_i32(encode_time(ts.time()));
        }
        (SQL_TYPE_TIME, SqlValue::Null) => stream.write_i32(0),
        (SQL_TYPE_TIME, SqlValue::Time(t)) => stream.write_i32(encode_time(*t)),
        (SQL_TYPE_DATE, SqlValue::Null) => stream.write_i32(encode_date(null_epoch())),
        (SQL_TYPE_DATE, SqlValue::Date(d)) => stream.write_i32(encode_date(*d)),
        (SQL_BLOB, SqlValue::Null) | (SQL_ARRAY, SqlValue::Null) => stream.write_i64(0),
        (SQL_BLOB, SqlValue::Blob(id)) => stream.write_i64(*id),
        (SQL_ARRAY, SqlValue::Array(id)) => stream.write_i64(*id),
        (sql_type, value) => {
            return Err(protocol!("cannot bind {value:?} to sql type {sql_type}").into());
        }
    }

    stream.write_i32(sqlind);
    Ok(())
}

fn write_varying(stream: &mut WireStream, field: &Field, bytes: &[u8]) -> Result<()> {
    if bytes.len() > field.length() as usize {
        return Err(protocol!(
            "{} bytes exceed varying column length {}",
            bytes.len(),
            field.length(),
        )
        .into());
    }
    stream.write_i32(bytes.len() as i32);
    stream.write_opaque(bytes, bytes.len());
    Ok(())
}
