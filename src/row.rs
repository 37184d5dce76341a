//! Column metadata and fetched rows.
use std::sync::Arc;

use crate::{charset::{self, Charset}, gds::*, value::SqlValue};

/// One column or parameter slot from a describe reply.
///
/// `sql_type` keeps the raw wire value, bit 0 of which is the nullable
/// flag. The subtype must be assigned before the length so the character
/// count is computed against the right charset width.
#[derive(Debug, Clone)]
pub struct Field {
    sql_type: i32,
    scale: i32,
    subtype: i32,
    length: i32,
    char_count: i32,
    charset: &'static Charset,
    pub name: String,
    pub relation: String,
    pub owner: String,
    pub alias: String,
}

impl Default for Field {
    fn default() -> Self {
        Self {
            sql_type: 0,
            scale: 0,
            subtype: 0,
            length: 0,
            char_count: -1,
            charset: &charset::NONE,
            name: String::new(),
            relation: String::new(),
            owner: String::new(),
            alias: String::new(),
        }
    }
}

impl Field {
    /// Wire type with the nullable bit masked off.
    pub fn sql_type(&self) -> i32 {
        self.sql_type & !1
    }

    pub fn raw_type(&self) -> i32 {
        self.sql_type
    }

    pub fn allows_null(&self) -> bool {
        self.sql_type & 1 != 0
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }

    pub fn subtype(&self) -> i32 {
        self.subtype
    }

    pub fn length(&self) -> i32 {
        self.length
    }

    pub fn char_count(&self) -> i32 {
        self.char_count
    }

    pub fn charset(&self) -> &'static Charset {
        self.charset
    }

    pub fn set_type(&mut self, sql_type: i32) {
        self.sql_type = sql_type;
    }

    pub fn set_scale(&mut self, scale: i32) {
        self.scale = scale;
    }

    /// Bits 0-7 of a character subtype hold the charset id, upper bits
    /// the collation.
    pub fn set_subtype(&mut self, subtype: i32) {
        if self.is_character() {
            self.charset = charset::by_id((subtype & 0xff) as u8);
        }
        self.subtype = subtype;
    }

    pub fn set_length(&mut self, length: i32) {
        self.length = length;
        if self.is_character() {
            self.char_count = length / self.charset.bytes_per_char as i32;
        }
    }

    pub fn is_character(&self) -> bool {
        matches!(self.sql_type(), SQL_TEXT | SQL_VARYING)
    }

    pub fn is_array(&self) -> bool {
        self.sql_type() == SQL_ARRAY
    }

    pub fn is_blob(&self) -> bool {
        self.sql_type() == SQL_BLOB
    }
}

/// The ordered field list of a select or bind message.
#[derive(Debug, Clone, Default)]
pub struct RowDescriptor {
    fields: Vec<Field>,
}

impl RowDescriptor {
    pub fn with_capacity(count: usize) -> Self {
        Self { fields: (0..count).map(|_| Field::default()).collect() }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn field_mut(&mut self, index: usize) -> Option<&mut Field> {
        self.fields.get_mut(index)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

/// One fetched row.
#[derive(Debug, Clone)]
pub struct Row {
    descriptor: Arc<RowDescriptor>,
    values: Vec<SqlValue>,
}

impl Row {
    pub(crate) fn new(descriptor: Arc<RowDescriptor>, values: Vec<SqlValue>) -> Self {
        Self { descriptor, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Look a column up by its alias, falling back to the field name.
    pub fn get_by_name(&self, name: &str) -> Option<&SqlValue> {
        let index = self.descriptor.fields().iter().position(|f| {
            f.alias.eq_ignore_ascii_case(name) || f.name.eq_ignore_ascii_case(name)
        })?;
        self.values.get(index)
    }

    pub fn descriptor(&self) -> &RowDescriptor {
        &self.descriptor
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [SqlValue] {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}
