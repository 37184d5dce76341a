//! Array slice I/O.
//!
//! Arrays travel as whole slices described by a slice description
//! language (SDL) program. The element layout comes from the system
//! tables, looked up once per relation and column.
use crate::{
    Result,
    attachment::DbAttachment,
    common::span,
    error::GdsError,
    gds::*,
    row::Field,
    statement::Statement,
    transaction::Transaction,
    value::SqlValue,
    wire::protocol,
};

/// Inclusive bounds of one array dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub lower: i32,
    pub upper: i32,
}

impl Bounds {
    fn extent(&self) -> usize {
        (self.upper - self.lower + 1).max(0) as usize
    }
}

/// Element layout and shape of an array column.
#[derive(Debug, Clone)]
pub struct ArrayDescriptor {
    relation: String,
    field_name: String,
    element: Field,
    dimensions: Vec<Bounds>,
}

const LOOKUP_SQL: &str = "select F.RDB$FIELD_TYPE, F.RDB$FIELD_SCALE, F.RDB$FIELD_LENGTH, \
F.RDB$FIELD_SUB_TYPE, D.RDB$LOWER_BOUND, D.RDB$UPPER_BOUND \
from RDB$RELATION_FIELDS R \
join RDB$FIELDS F on R.RDB$FIELD_SOURCE = F.RDB$FIELD_NAME \
join RDB$FIELD_DIMENSIONS D on D.RDB$FIELD_NAME = F.RDB$FIELD_NAME \
where R.RDB$RELATION_NAME = '{0}' and R.RDB$FIELD_NAME = '{1}' \
order by D.RDB$DIMENSION";

impl ArrayDescriptor {
    /// Fetch the element type and bounds from the system tables.
    pub fn lookup(
        db: &DbAttachment,
        transaction: &mut Transaction,
        relation: &str,
        field_name: &str,
    ) -> Result<Self> {
        span!("array_lookup");
        let sql = LOOKUP_SQL
            .replace("{0}", &relation.replace('\'', "''"))
            .replace("{1}", &field_name.replace('\'', "''"));

        let mut statement = Statement::new(db)?;
        let result = Self::lookup_rows(&mut statement, transaction, &sql, relation, field_name);
        statement.drop_statement().ok();
        result
    }

    fn lookup_rows(
        statement: &mut Statement,
        transaction: &mut Transaction,
        sql: &str,
        relation: &str,
        field_name: &str,
    ) -> Result<Self> {
        statement.prepare(transaction, sql)?;
        statement.execute(transaction, &[])?;

        let mut element = Field::default();
        let mut dimensions = Vec::new();
        while let Some(row) = statement.fetch()? {
            let field_type = int_at(&row, 0)?;
            let scale = int_at(&row, 1)?;
            let length = int_at(&row, 2)?;
            let subtype = int_at(&row, 3)?;
            element.set_type(sql_type_of(field_type as i32)?);
            element.set_scale(scale as i32);
            element.set_subtype(subtype as i32);
            element.set_length(length as i32);
            dimensions.push(Bounds {
                lower: int_at(&row, 4)? as i32,
                upper: int_at(&row, 5)? as i32,
            });
        }
        if dimensions.is_empty() {
            return Err(GdsError::raise(ISC_INVALID_DIMENSION, &["0", "1"]).into());
        }
        Ok(Self {
            relation: relation.to_string(),
            field_name: field_name.to_string(),
            element,
            dimensions,
        })
    }

    pub fn element(&self) -> &Field {
        &self.element
    }

    pub fn dimensions(&self) -> &[Bounds] {
        &self.dimensions
    }

    /// Total number of elements in the slice.
    pub fn element_count(&self) -> usize {
        self.dimensions.iter().map(Bounds::extent).product()
    }

    fn element_size(&self) -> Result<usize> {
        let length = self.element.length() as usize;
        Ok(match self.element.sql_type() {
            SQL_TEXT => length + pad_of(length),
            SQL_VARYING => 4 + length + pad_of(length),
            SQL_SHORT | SQL_LONG | SQL_FLOAT | SQL_TYPE_DATE | SQL_TYPE_TIME => 4,
            SQL_DOUBLE | SQL_INT64 | SQL_QUAD | SQL_TIMESTAMP => 8,
            other => return Err(protocol!("array element type {other} not supported").into()),
        })
    }

    fn slice_length(&self) -> Result<usize> {
        Ok(self.element_size()? * self.element_count())
    }

    fn blr_code(&self) -> Result<u8> {
        Ok(match self.element.sql_type() {
            SQL_TEXT => BLR_TEXT,
            SQL_VARYING => BLR_VARYING,
            SQL_SHORT => BLR_SHORT,
            SQL_LONG => BLR_LONG,
            SQL_QUAD => BLR_QUAD,
            SQL_INT64 => BLR_INT64,
            SQL_FLOAT => BLR_FLOAT,
            SQL_DOUBLE => BLR_DOUBLE,
            SQL_TIMESTAMP => BLR_TIMESTAMP,
            SQL_TYPE_DATE => BLR_SQL_DATE,
            SQL_TYPE_TIME => BLR_SQL_TIME,
            other => return Err(protocol!("array element type {other} not supported").into()),
        })
    }

    /// The SDL program describing one whole-array slice.
    fn build_sdl(&self) -> Result<Vec<u8>> {
        let mut sdl = Vec::with_capacity(64);
        sdl.push(ISC_SDL_VERSION1);
        sdl.push(ISC_SDL_STRUCT);
        sdl.push(1);
        sdl.push(self.blr_code()?);
        match self.element.sql_type() {
            SQL_SHORT | SQL_LONG | SQL_INT64 | SQL_QUAD => {
                sdl.push(self.element.scale() as i8 as u8);
            }
            SQL_TEXT | SQL_VARYING => {
                sdl.extend_from_slice(&(self.element.length() as u16).to_le_bytes());
            }
            _ => {}
        }

        stuff_string(&mut sdl, ISC_SDL_RELATION, &self.relation);
        stuff_string(&mut sdl, ISC_SDL_FIELD, &self.field_name);

        for (index, bounds) in self.dimensions.iter().enumerate() {
            if bounds.lower == 1 {
                sdl.push(ISC_SDL_DO1);
                sdl.push(index as u8);
            } else {
                sdl.push(ISC_SDL_DO2);
                sdl.push(index as u8);
                stuff_literal(&mut sdl, bounds.lower);
            }
            stuff_literal(&mut sdl, bounds.upper);
        }

        sdl.push(ISC_SDL_ELEMENT);
        sdl.push(1);
        sdl.push(ISC_SDL_SCALAR);
        sdl.push(0);
        sdl.push(self.dimensions.len() as u8);
        for index in 0..self.dimensions.len() {
            sdl.push(ISC_SDL_VARIABLE);
            sdl.push(index as u8);
        }
        sdl.push(ISC_SDL_EOC);
        Ok(sdl)
    }
}

/// Read a whole array slice as a flat element vector.
pub fn get_slice(
    transaction: &Transaction,
    descriptor: &ArrayDescriptor,
    id: i64,
) -> Result<Vec<SqlValue>> {
    span!("get_slice");
    let sdl = descriptor.build_sdl()?;
    let slice_length = descriptor.slice_length()? as i32;

    let db = transaction.db().clone();
    let mut att = db.inner.lock();
    att.stream().write_i32(OP_GET_SLICE);
    att.stream().write_i32(transaction.handle());
    att.stream().write_i64(id);
    att.stream().write_i32(slice_length);
    att.stream().write_buffer(&sdl);
    att.stream().write_string("");
    att.stream().write_i32(0); // slice parameters
    att.stream().flush()?;

    let op = att.next_operation()?;
    if op != OP_SLICE {
        att.receive_response()?;
        return Err(protocol!("expected op_slice, got operation {op}").into());
    }
    att.read_operation()?;
    let length = att.stream().read_i32()? as usize;
    let data = att.stream().read_opaque(length)?;
    drop(att);

    decode_elements(&data, descriptor)
}

/// Write a whole slice. Pass `id` 0 for a fresh array, the server
/// assigned id to store in the column comes back.
pub fn put_slice(
    transaction: &Transaction,
    descriptor: &ArrayDescriptor,
    id: i64,
    values: &[SqlValue],
) -> Result<i64> {
    span!("put_slice");
    let expected = descriptor.element_count();
    if values.len() != expected {
        let got = values.len().to_string();
        let want = expected.to_string();
        return Err(GdsError::raise(ISC_INVALID_DIMENSION, &[&got, &want]).into());
    }
    let sdl = descriptor.build_sdl()?;
    let data = encode_elements(values, descriptor)?;

    let db = transaction.db().clone();
    let mut att = db.inner.lock();
    att.stream().write_i32(OP_PUT_SLICE);
    att.stream().write_i32(transaction.handle());
    att.stream().write_i64(id);
    att.stream().write_i32(data.len() as i32);
    att.stream().write_buffer(&sdl);
    att.stream().write_string("");
    att.stream().write_i32(data.len() as i32);
    att.stream().write_raw(&data);
    att.stream().flush()?;
    let response = att.receive_response()?;
    Ok(response.blob_handle)
}

fn pad_of(len: usize) -> usize {
    (4usize.wrapping_sub(len)) & 3
}

fn stuff_string(sdl: &mut Vec<u8>, tag: u8, value: &str) {
    sdl.push(tag);
    sdl.push(value.len().min(255) as u8);
    sdl.extend_from_slice(&value.as_bytes()[..value.len().min(255)]);
}

fn stuff_literal(sdl: &mut Vec<u8>, value: i32) {
    if (0..=255).contains(&value) {
        sdl.push(ISC_SDL_TINY_INTEGER);
        sdl.push(value as u8);
    } else if (i16::MIN as i32..=i16::MAX as i32).contains(&value) {
        sdl.push(ISC_SDL_SHORT_INTEGER);
        sdl.extend_from_slice(&(value as i16).to_le_bytes());
    } else {
        sdl.push(ISC_SDL_LONG_INTEGER);
        sdl.extend_from_slice(&value.to_le_bytes());
    }
}

fn int_at(row: &crate::row::Row, index: usize) -> Result<i64> {
    match row.get(index) {
        Some(SqlValue::Integer { value, scale: 0 }) => Ok(*value),
        Some(SqlValue::Null) => Ok(0),
        _ => Err(protocol!("unexpected system table value at column {index}").into()),
    }
}

/// Map an `RDB$FIELD_TYPE` code to the wire SQL type.
fn sql_type_of(field_type: i32) -> Result<i32> {
    Ok(match field_type {
        BLR_FIELD_TEXT | BLR_FIELD_CSTRING => SQL_TEXT,
        BLR_FIELD_VARYING => SQL_VARYING,
        BLR_FIELD_SHORT => SQL_SHORT,
        BLR_FIELD_LONG => SQL_LONG,
        BLR_FIELD_QUAD => SQL_QUAD,
        BLR_FIELD_INT64 => SQL_INT64,
        BLR_FIELD_FLOAT => SQL_FLOAT,
        BLR_FIELD_DOUBLE | BLR_FIELD_D_FLOAT => SQL_DOUBLE,
        BLR_FIELD_TIMESTAMP => SQL_TIMESTAMP,
        BLR_FIELD_SQL_DATE => SQL_TYPE_DATE,
        BLR_FIELD_SQL_TIME => SQL_TYPE_TIME,
        other => return Err(protocol!("array element type {other} not supported").into()),
    })
}

fn take<'a>(data: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
    if *pos + n > data.len() {
        return Err(protocol!("slice data ends inside an element").into());
    }
    let chunk = &data[*pos..*pos + n];
    *pos += n;
    Ok(chunk)
}

fn decode_elements(data: &[u8], descriptor: &ArrayDescriptor) -> Result<Vec<SqlValue>> {
    let count = descriptor.element_count();
    let scale = descriptor.element.scale();
    let mut out = Vec::with_capacity(count);
    let mut pos = 0;
    let mut take = |n: usize| take(data, &mut pos, n);

    for _ in 0..count {
        let value = match descriptor.element.sql_type() {
            SQL_TEXT => {
                let length = descriptor.element.length() as usize;
                let bytes = take(length)?;
                let text = String::from_utf8_lossy(bytes).into_owned();
                take(pad_of(length))?;
                SqlValue::Text(text)
            }
            SQL_VARYING => {
                let declared = descriptor.element.length() as usize;
                let length = i32::from_be_bytes(take(4)?.try_into().unwrap()) as usize;
                if length > declared {
                    return Err(protocol!("slice data ends inside an element").into());
                }
                let bytes = take(length)?;
                let text = String::from_utf8_lossy(bytes).trim_end().to_string();
                take(declared - length + pad_of(declared))?;
                SqlValue::Text(text)
            }
            SQL_SHORT | SQL_LONG => {
                let value = i32::from_be_bytes(take(4)?.try_into().unwrap());
                SqlValue::Integer { value: value as i64, scale }
            }
            SQL_INT64 | SQL_QUAD => {
                let value = i64::from_be_bytes(take(8)?.try_into().unwrap());
                SqlValue::Integer { value, scale }
            }
            SQL_FLOAT => {
                let bits = u32::from_be_bytes(take(4)?.try_into().unwrap());
                SqlValue::Float(f32::from_bits(bits))
            }
            SQL_DOUBLE => {
                let bits = u64::from_be_bytes(take(8)?.try_into().unwrap());
                SqlValue::Double(f64::from_bits(bits))
            }
            SQL_TYPE_DATE => {
                let days = i32::from_be_bytes(take(4)?.try_into().unwrap());
                SqlValue::Date(crate::value::decode_date(days)?)
            }
            SQL_TYPE_TIME => {
                let ticks = i32::from_be_bytes(take(4)?.try_into().unwrap());
                SqlValue::Time(crate::value::decode_time(ticks)?)
            }
            SQL_TIMESTAMP => {
                let days = i32::from_be_bytes(take(4)?.try_into().unwrap());
                let ticks = i32::from_be_bytes(take(4)?.try_into().unwrap());
                let date = crate::value::decode_date(days)?;
                let time = crate::value::decode_time(ticks)?;
                SqlValue::Timestamp(date.with_time(time))
            }
            other => return Err(protocol!("array element type {other} not supported").into()),
        };
        out.push(value);
    }
    Ok(out)
}

fn encode_elements(values: &[SqlValue], descriptor: &ArrayDescriptor) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(descriptor.slice_length()?);
    let scale = descriptor.element.scale();

    for value in values {
        match (descriptor.element.sql_type(), value) {
            (SQL_TEXT, SqlValue::Text(text)) => {
                let length = descriptor.element.length() as usize;
                if text.len() > length {
                    return Err(protocol!("array element exceeds declared length").into());
                }
                out.extend_from_slice(text.as_bytes());
                out.resize(out.len() + length - text.len(), 0x20);
                out.resize(out.len() + pad_of(length), 0);
            }
            (SQL_VARYING, SqlValue::Text(text)) => {
                let declared = descriptor.element.length() as usize;
                if text.len() > declared {
                    return Err(protocol!("array element exceeds declared length").into());
                }
                out.extend_from_slice(&(text.len() as i32).to_be_bytes());
                out.extend_from_slice(text.as_bytes());
                out.resize(out.len() + declared - text.len() + pad_of(declared), 0);
            }
            (SQL_SHORT | SQL_LONG, SqlValue::Integer { value, scale: from }) => {
                let value = crate::value::rescale(*value, *from, scale)?;
                out.extend_from_slice(&(value as i32).to_be_bytes());
            }
            (SQL_INT64 | SQL_QUAD, SqlValue::Integer { value, scale: from }) => {
                let value = crate::value::rescale(*value, *from, scale)?;
                out.extend_from_slice(&value.to_be_bytes());
            }
            (SQL_FLOAT, SqlValue::Float(v)) => {
                out.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            (SQL_DOUBLE, SqlValue::Double(v)) => {
                out.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            (SQL_TYPE_DATE, SqlValue::Date(date)) => {
                out.extend_from_slice(&crate::value::encode_date(*date).to_be_bytes());
            }
            (SQL_TYPE_TIME, SqlValue::Time(time)) => {
                out.extend_from_slice(&crate::value::encode_time(*time).to_be_bytes());
            }
            (SQL_TIMESTAMP, SqlValue::Timestamp(ts)) => {
                out.extend_from_slice(&crate::value::encode_date(ts.date()).to_be_bytes());
                out.extend_from_slice(&crate::value::encode_time(ts.time()).to_be_bytes());
            }
            (sql_type, other) => {
                return Err(
                    protocol!("value {other:?} does not match array element type {sql_type}")
                        .into(),
                );
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    fn long_descriptor(dimensions: Vec<Bounds>) -> ArrayDescriptor {
        let mut element = Field::default();
        element.set_type(SQL_LONG);
        element.set_length(4);
        ArrayDescriptor {
            relation: "T".into(),
            field_name: "V".into(),
            element,
            dimensions,
        }
    }

    #[test]
    fn sdl_for_one_dimensional_long_array() {
        let descriptor = long_descriptor(vec![Bounds { lower: 1, upper: 4 }]);
        let sdl = descriptor.build_sdl().unwrap();
        assert_eq!(
            sdl,
            [
                ISC_SDL_VERSION1, ISC_SDL_STRUCT, 1, BLR_LONG, 0,
                ISC_SDL_RELATION, 1, b'T',
                ISC_SDL_FIELD, 1, b'V',
                ISC_SDL_DO1, 0,
                ISC_SDL_TINY_INTEGER, 4,
                ISC_SDL_ELEMENT, 1, ISC_SDL_SCALAR, 0, 1,
                ISC_SDL_VARIABLE, 0,
                ISC_SDL_EOC,
            ],
        );
    }

    #[test]
    fn sdl_with_explicit_lower_bound() {
        let descriptor = long_descriptor(vec![Bounds { lower: -3, upper: 300 }]);
        let sdl = descriptor.build_sdl().unwrap();
        // do2 with a short literal lower bound and a short upper bound
        let tail = [
            ISC_SDL_DO2, 0,
            ISC_SDL_SHORT_INTEGER, 0xfd, 0xff,
            ISC_SDL_SHORT_INTEGER, 44, 1,
        ];
        assert!(sdl.windows(tail.len()).any(|w| w == tail));
    }

    #[test]
    fn element_count_spans_dimensions() {
        let descriptor = long_descriptor(vec![
            Bounds { lower: 1, upper: 3 },
            Bounds { lower: 0, upper: 4 },
        ]);
        assert_eq!(descriptor.element_count(), 15);
        assert_eq!(descriptor.slice_length().unwrap(), 60);
    }

    #[test]
    fn long_elements_round_trip() {
        let descriptor = long_descriptor(vec![Bounds { lower: 1, upper: 3 }]);
        let values = vec![
            SqlValue::Integer { value: 1, scale: 0 },
            SqlValue::Integer { value: -7, scale: 0 },
            SqlValue::Integer { value: 300_000, scale: 0 },
        ];
        let data = encode_elements(&values, &descriptor).unwrap();
        assert_eq!(data.len(), 12);
        assert_eq!(decode_elements(&data, &descriptor).unwrap(), values);
    }

    #[test]
    fn text_elements_are_space_filled() {
        let mut element = Field::default();
        element.set_type(SQL_TEXT);
        element.set_length(5);
        let descriptor = ArrayDescriptor {
            relation: "T".into(),
            field_name: "V".into(),
            element,
            dimensions: vec![Bounds { lower: 1, upper: 2 }],
        };
        let values = vec![SqlValue::Text("ab".into()), SqlValue::Text("cdefg".into())];
        let data = encode_elements(&values, &descriptor).unwrap();
        // each element is 5 bytes space filled plus 3 pad bytes
        assert_eq!(data.len(), 16);
        assert_eq!(&data[..8], b"ab   \0\0\0");

        let decoded = decode_elements(&data, &descriptor).unwrap();
        assert_eq!(decoded[0], SqlValue::Text("ab   ".into()));
        assert_eq!(decoded[1], SqlValue::Text("cdefg".into()));
    }

    #[test]
    fn put_slice_rejects_wrong_element_count() {
        let descriptor = long_descriptor(vec![Bounds { lower: 1, upper: 3 }]);
        let values = vec![SqlValue::Integer { value: 1, scale: 0 }];
        let err = encode_put_mismatch(&descriptor, &values);
        assert_eq!(err.gds_code(), Some(ISC_INVALID_DIMENSION));
    }

    fn encode_put_mismatch(descriptor: &ArrayDescriptor, values: &[SqlValue]) -> crate::Error {
        let expected = descriptor.element_count();
        assert_ne!(values.len(), expected);
        GdsError::raise(
            ISC_INVALID_DIMENSION,
            &[&values.len().to_string(), &expected.to_string()],
        )
        .into()
    }
}
