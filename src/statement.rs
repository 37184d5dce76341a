//! Statement allocation, prepare, execute and fetch.
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::{
    Result,
    attachment::{Attachment, DbAttachment},
    common::{debug, span, verbose},
    error::{GdsError, StateError},
    gds::*,
    row::{Row, RowDescriptor},
    transaction::Transaction,
    value::{SqlValue, read_value, write_value},
    wire::{protocol, vax_integer},
};

/// Info items requested when preparing, output columns variant.
const DESCRIBE_ITEMS: &[u8] = &[
    ISC_INFO_SQL_STMT_TYPE,
    ISC_INFO_SQL_SELECT,
    ISC_INFO_SQL_DESCRIBE_VARS,
    ISC_INFO_SQL_SQLDA_SEQ,
    ISC_INFO_SQL_TYPE,
    ISC_INFO_SQL_SUB_TYPE,
    ISC_INFO_SQL_SCALE,
    ISC_INFO_SQL_LENGTH,
    ISC_INFO_SQL_FIELD,
    ISC_INFO_SQL_RELATION,
    ISC_INFO_SQL_OWNER,
    ISC_INFO_SQL_ALIAS,
    ISC_INFO_SQL_DESCRIBE_END,
];

/// Same block for the input parameters.
const DESCRIBE_BIND_ITEMS: &[u8] = &[
    ISC_INFO_SQL_BIND,
    ISC_INFO_SQL_DESCRIBE_VARS,
    ISC_INFO_SQL_SQLDA_SEQ,
    ISC_INFO_SQL_TYPE,
    ISC_INFO_SQL_SUB_TYPE,
    ISC_INFO_SQL_SCALE,
    ISC_INFO_SQL_LENGTH,
    ISC_INFO_SQL_FIELD,
    ISC_INFO_SQL_RELATION,
    ISC_INFO_SQL_OWNER,
    ISC_INFO_SQL_ALIAS,
    ISC_INFO_SQL_DESCRIBE_END,
];

const RECORDS_ITEMS: &[u8] = &[ISC_INFO_SQL_RECORDS];
const PLAN_ITEMS: &[u8] = &[ISC_INFO_SQL_GET_PLAN];

/// Rows fetched per `op_fetch` round trip.
const FETCH_SIZE: i32 = 200;

/// Batch fetch end marker in `op_fetch_response`.
const FETCH_EOF: i32 = 100;

/// Server side classification of a prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    GetSegment,
    PutSegment,
    ExecProcedure,
    StartTransaction,
    Commit,
    Rollback,
    SelectForUpdate,
    SetGenerator,
    Savepoint,
}

impl StatementType {
    fn from_code(code: i32) -> Result<Self> {
        Ok(match code {
            ISC_INFO_SQL_STMT_SELECT => Self::Select,
            ISC_INFO_SQL_STMT_INSERT => Self::Insert,
            ISC_INFO_SQL_STMT_UPDATE => Self::Update,
            ISC_INFO_SQL_STMT_DELETE => Self::Delete,
            ISC_INFO_SQL_STMT_DDL => Self::Ddl,
            ISC_INFO_SQL_STMT_GET_SEGMENT => Self::GetSegment,
            ISC_INFO_SQL_STMT_PUT_SEGMENT => Self::PutSegment,
            ISC_INFO_SQL_STMT_EXEC_PROCEDURE => Self::ExecProcedure,
            ISC_INFO_SQL_STMT_START_TRANS => Self::StartTransaction,
            ISC_INFO_SQL_STMT_COMMIT => Self::Commit,
            ISC_INFO_SQL_STMT_ROLLBACK => Self::Rollback,
            ISC_INFO_SQL_STMT_SELECT_FOR_UPD => Self::SelectForUpdate,
            ISC_INFO_SQL_STMT_SET_GENERATOR => Self::SetGenerator,
            ISC_INFO_SQL_STMT_SAVEPOINT => Self::Savepoint,
            other => return Err(protocol!("unknown statement type {other}").into()),
        })
    }

    /// Whether executing this statement opens a fetchable cursor.
    pub fn returns_rows(&self) -> bool {
        matches!(self, Self::Select | Self::SelectForUpdate | Self::ExecProcedure)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatementState {
    Allocated,
    Prepared,
    Executed,
    Closed,
    Deallocated,
    Error,
}

impl StatementState {
    fn name(&self) -> &'static str {
        match self {
            Self::Allocated => "allocated",
            Self::Prepared => "prepared",
            Self::Executed => "executed",
            Self::Closed => "closed",
            Self::Deallocated => "deallocated",
            Self::Error => "in error",
        }
    }
}

/// Fetch state shared with the owning transaction.
///
/// When the transaction completes, every registered cursor is reset so
/// a later fetch cannot read rows from a context the server discarded.
pub(crate) struct Cursor {
    state: StatementState,
    rows: VecDeque<Row>,
    all_rows_fetched: bool,
}

impl Cursor {
    fn new() -> Self {
        Self {
            state: StatementState::Allocated,
            rows: VecDeque::new(),
            all_rows_fetched: false,
        }
    }

    pub(crate) fn transaction_completed(&mut self) {
        self.rows.clear();
        self.all_rows_fetched = false;
        if self.state == StatementState::Executed {
            self.state = StatementState::Closed;
        }
    }
}

/// Totals from the `isc_info_sql_records` reply.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecordsAffected {
    pub selected: i32,
    pub inserted: i32,
    pub updated: i32,
    pub deleted: i32,
}

impl RecordsAffected {
    pub fn total(&self) -> i32 {
        self.inserted + self.updated + self.deleted
    }
}

/// A prepared statement handle.
///
/// Allocation happens on construction. Release is explicit through
/// [`drop_statement`][Statement::drop_statement], dropping the value
/// does not touch the wire.
pub struct Statement {
    db: DbAttachment,
    handle: i32,
    statement_type: StatementType,
    fields: Arc<RowDescriptor>,
    parameters: Option<Arc<RowDescriptor>>,
    cursor: Arc<Mutex<Cursor>>,
}

impl Statement {
    /// Allocate a statement handle on the server.
    pub fn new(db: &DbAttachment) -> Result<Self> {
        span!("allocate");
        let mut att = db.inner.lock();
        att.stream().write_i32(OP_ALLOCATE_STATEMENT);
        let db_handle = att.handle();
        att.stream().write_i32(db_handle);
        att.stream().flush()?;
        let response = att.receive_response()?;
        drop(att);

        debug!("allocated statement {}", response.object_handle);
        Ok(Self {
            db: db.clone(),
            handle: response.object_handle,
            statement_type: StatementType::Select,
            fields: Arc::new(RowDescriptor::with_capacity(0)),
            parameters: None,
            cursor: Arc::new(Mutex::new(Cursor::new())),
        })
    }

    pub fn handle(&self) -> i32 {
        self.handle
    }

    /// Classification from the last prepare. Meaningless before it.
    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    /// Output column metadata from the last prepare.
    pub fn fields(&self) -> &RowDescriptor {
        &self.fields
    }

    /// Input parameter metadata, present after
    /// [`describe_parameters`][Statement::describe_parameters].
    pub fn parameters(&self) -> Option<&RowDescriptor> {
        self.parameters.as_deref()
    }

    /// Compile `sql` under `transaction` and describe the output columns.
    pub fn prepare(&mut self, transaction: &Transaction, sql: &str) -> Result<()> {
        span!("prepare");
        {
            let cursor = self.cursor.lock();
            if cursor.state == StatementState::Deallocated {
                return Err(state_error(cursor.state, "an allocated handle"));
            }
        }
        // a compiled handle is never re-prepared in place: the old one
        // is dropped and replaced before the new text goes out
        if self.cursor.lock().state != StatementState::Allocated {
            self.reallocate()?;
        }
        self.parameters = None;

        let result = {
            let mut att = self.db.inner.lock();
            let dialect = att.params().dialect;
            att.stream().write_i32(OP_PREPARE_STATEMENT);
            att.stream().write_i32(transaction.handle());
            att.stream().write_i32(self.handle);
            att.stream().write_i32(dialect);
            att.stream().write_string(sql);
            att.stream().write_buffer(DESCRIBE_ITEMS);
            att.stream().write_i32(MAX_BUFFER_SIZE);
            att.stream().flush().and_then(|()| att.receive_response())
        };
        let data = match result {
            Ok(response) => response.data,
            Err(err) => {
                if err.is_io() {
                    self.cursor.lock().state = StatementState::Error;
                }
                return Err(read_err(err));
            }
        };

        self.fields = self.parse_descriptor(data, DESCRIBE_ITEMS)?;
        let mut cursor = self.cursor.lock();
        cursor.state = StatementState::Prepared;
        cursor.rows.clear();
        cursor.all_rows_fetched = false;
        verbose!("prepared as {:?}, {} columns", self.statement_type, self.fields.len());
        Ok(())
    }

    /// Describe the input parameters of a prepared statement.
    pub fn describe_parameters(&mut self) -> Result<()> {
        let state = self.cursor.lock().state;
        if state == StatementState::Allocated {
            return Err(state_error(state, "a prepared statement"));
        }
        let data = self.info_request(DESCRIBE_BIND_ITEMS, MAX_BUFFER_SIZE)?;
        self.parameters = Some(self.parse_descriptor(data, DESCRIBE_BIND_ITEMS)?);
        Ok(())
    }

    /// Execute with the given parameter values.
    ///
    /// Stored procedures run through `op_execute2` and queue their
    /// singleton output row for [`fetch`][Statement::fetch].
    pub fn execute(&mut self, transaction: &mut Transaction, params: &[SqlValue]) -> Result<()> {
        span!("execute");
        {
            let cursor = self.cursor.lock();
            if !matches!(
                cursor.state,
                StatementState::Prepared | StatementState::Executed | StatementState::Closed,
            ) {
                return Err(state_error(cursor.state, "a prepared statement"));
            }
        }
        if self.parameters.is_none() && !params.is_empty() {
            self.describe_parameters()?;
        }
        let bind = match &self.parameters {
            Some(descriptor) if !descriptor.is_empty() => Some(descriptor.clone()),
            _ => None,
        };
        if bind.as_ref().map_or(0, |d| d.len()) != params.len() {
            return Err(GdsError::raise(ISC_DSQL_SQLDA_ERR, &[]).into());
        }

        let singleton = self.statement_type == StatementType::ExecProcedure;
        let op = if singleton { OP_EXECUTE2 } else { OP_EXECUTE };

        let mut att = self.db.inner.lock();
        att.stream().write_i32(op);
        att.stream().write_i32(self.handle);
        att.stream().write_i32(transaction.handle());

        match &bind {
            Some(descriptor) => {
                let blr = build_blr(descriptor)?;
                att.stream().write_buffer(&blr);
                att.stream().write_i32(0); // message number
                att.stream().write_i32(1); // message count
                for (field, value) in descriptor.fields().iter().zip(params) {
                    write_value(att.stream(), field, value)?;
                }
            }
            None => {
                att.stream().write_buffer(&[]);
                att.stream().write_i32(0);
                att.stream().write_i32(0);
            }
        }

        if singleton {
            let blr = build_blr(&self.fields)?;
            att.stream().write_buffer(&blr);
            att.stream().write_i32(0); // output message number
        }
        let mut cursor = self.cursor.lock();
        cursor.rows.clear();
        cursor.all_rows_fetched = false;

        let exchange = (|| -> Result<()> {
            att.stream().flush()?;
            if singleton && att.next_operation()? == OP_SQL_RESPONSE {
                att.read_operation()?;
                let count = att.stream().read_i32()?;
                if count > 0 {
                    let row = read_row(&mut att, &self.fields)?;
                    cursor.rows.push_back(row);
                }
                cursor.all_rows_fetched = true;
            }
            att.receive_response()?;
            Ok(())
        })();
        drop(att);
        if let Err(err) = exchange {
            if err.is_io() {
                cursor.state = StatementState::Error;
            }
            return Err(read_err(err));
        }

        cursor.state = StatementState::Executed;
        drop(cursor);
        transaction.register(&self.cursor);
        Ok(())
    }

    /// Next row of the open cursor, `None` once exhausted.
    pub fn fetch(&mut self) -> Result<Option<Row>> {
        {
            let mut cursor = self.cursor.lock();
            if cursor.state != StatementState::Executed {
                return Err(state_error(cursor.state, "an executed statement"));
            }
            if let Some(row) = cursor.rows.pop_front() {
                return Ok(Some(row));
            }
            if cursor.all_rows_fetched {
                return Ok(None);
            }
        }
        if !self.statement_type.returns_rows() {
            let state = self.cursor.lock().state;
            return Err(state_error(state, "a statement returning rows"));
        }

        let result = self.fetch_batch();
        if result.is_err() {
            self.cursor.lock().state = StatementState::Error;
        }
        result?;

        let mut cursor = self.cursor.lock();
        Ok(cursor.rows.pop_front())
    }

    fn fetch_batch(&self) -> Result<()> {
        let blr = build_blr(&self.fields)?;
        let mut att = self.db.inner.lock();
        att.stream().write_i32(OP_FETCH);
        att.stream().write_i32(self.handle);
        att.stream().write_buffer(&blr);
        att.stream().write_i32(0); // message number
        att.stream().write_i32(FETCH_SIZE);
        att.stream().flush().map_err(read_err)?;

        let mut cursor = self.cursor.lock();
        loop {
            let op = att.next_operation().map_err(read_err)?;
            if op != OP_FETCH_RESPONSE {
                att.receive_response()?;
                return Err(protocol!("expected op_fetch_response, got operation {op}").into());
            }
            att.read_operation()?;
            let status = att.stream().read_i32().map_err(read_err)?;
            let count = att.stream().read_i32().map_err(read_err)?;
            if status == 0 && count > 0 {
                let row = read_row(&mut att, &self.fields).map_err(read_err)?;
                cursor.rows.push_back(row);
                continue;
            }
            if status == FETCH_EOF {
                cursor.all_rows_fetched = true;
            }
            return Ok(());
        }
    }

    /// Close the open cursor, keeping the statement prepared.
    ///
    /// Singleton-result statements never open a server cursor, so this
    /// is a no-op for them.
    pub fn close(&mut self) -> Result<()> {
        if self.statement_type == StatementType::ExecProcedure {
            return Ok(());
        }
        let state = self.cursor.lock().state;
        if state != StatementState::Executed {
            return Err(state_error(state, "an open cursor"));
        }
        self.free(DSQL_CLOSE)?;
        let mut cursor = self.cursor.lock();
        cursor.state = StatementState::Closed;
        cursor.rows.clear();
        cursor.all_rows_fetched = false;
        Ok(())
    }

    /// Free the server handle. The statement cannot be used afterwards.
    pub fn drop_statement(&mut self) -> Result<()> {
        if self.cursor.lock().state == StatementState::Deallocated {
            return Ok(());
        }
        self.free(DSQL_DROP)?;
        self.cursor.lock().state = StatementState::Deallocated;
        Ok(())
    }

    fn reallocate(&mut self) -> Result<()> {
        let mut att = self.db.inner.lock();
        att.stream().write_i32(OP_FREE_STATEMENT);
        att.stream().write_i32(self.handle);
        att.stream().write_i32(DSQL_DROP);
        att.stream().flush()?;
        att.receive_response()?;

        att.stream().write_i32(OP_ALLOCATE_STATEMENT);
        let db_handle = att.handle();
        att.stream().write_i32(db_handle);
        att.stream().flush()?;
        let response = att.receive_response()?;
        drop(att);

        debug!("statement {} reallocated as {}", self.handle, response.object_handle);
        self.handle = response.object_handle;
        let mut cursor = self.cursor.lock();
        cursor.state = StatementState::Allocated;
        cursor.rows.clear();
        cursor.all_rows_fetched = false;
        Ok(())
    }

    fn free(&self, option: i32) -> Result<()> {
        let mut att = self.db.inner.lock();
        att.stream().write_i32(OP_FREE_STATEMENT);
        att.stream().write_i32(self.handle);
        att.stream().write_i32(option);
        att.stream().flush()?;
        att.receive_response()?;
        Ok(())
    }

    /// Name the cursor for positioned updates and deletes.
    pub fn set_cursor_name(&mut self, name: &str) -> Result<()> {
        let mut cursor_name = Vec::with_capacity(name.len() + 1);
        cursor_name.extend_from_slice(name.as_bytes());
        cursor_name.push(0);

        let mut att = self.db.inner.lock();
        att.stream().write_i32(OP_SET_CURSOR);
        att.stream().write_i32(self.handle);
        att.stream().write_buffer(&cursor_name);
        att.stream().write_i32(0); // cursor type, reserved
        att.stream().flush()?;
        att.receive_response()?;
        Ok(())
    }

    /// Row counts of the last execute.
    pub fn records_affected(&self) -> Result<RecordsAffected> {
        let data = self.info_request(RECORDS_ITEMS, MAX_BUFFER_SIZE)?;
        parse_records(&data)
    }

    /// Server access plan of a prepared statement.
    pub fn execution_plan(&self) -> Result<String> {
        let mut data = self.info_request(PLAN_ITEMS, MAX_BUFFER_SIZE)?;
        if !data.is_empty() && data[0] == ISC_INFO_TRUNCATED {
            data = self.info_request(PLAN_ITEMS, MAX_BUFFER_SIZE * 32)?;
        }
        if data.len() < 4 || data[0] != ISC_INFO_SQL_GET_PLAN {
            return Err(protocol!("malformed plan info reply").into());
        }
        let len = vax_integer(&data, 1, 2) as usize;
        if len < 1 || 3 + len > data.len() {
            return Err(protocol!("malformed plan info reply").into());
        }
        // the plan text starts with a newline the server puts there
        Ok(String::from_utf8_lossy(&data[4..3 + len]).into_owned())
    }

    fn info_request(&self, items: &[u8], buffer_length: i32) -> Result<Bytes> {
        let mut att = self.db.inner.lock();
        att.stream().write_i32(OP_INFO_SQL);
        att.stream().write_i32(self.handle);
        att.stream().write_i32(0); // incarnation
        att.stream().write_buffer(items);
        att.stream().write_i32(buffer_length);
        att.stream().flush()?;
        Ok(att.receive_response()?.data)
    }

    /// Walk a describe reply into a descriptor, re-requesting from the
    /// last complete variable whenever the reply was truncated.
    fn parse_descriptor(&mut self, data: Bytes, items: &[u8]) -> Result<Arc<RowDescriptor>> {
        let mut descriptor: Option<RowDescriptor> = None;
        let mut buffer = data;
        while let Some(lastindex) = self.parse_info_block(&buffer, &mut descriptor)? {
            // restart one variable early, a variable may have been cut
            let lastindex = lastindex - 1;
            let mut request = Vec::with_capacity(4 + items.len());
            request.push(ISC_INFO_SQL_SQLDA_START);
            request.push(2);
            request.push((lastindex & 255) as u8);
            request.push((lastindex >> 8) as u8);
            request.extend_from_slice(items);
            buffer = self.info_request(&request, MAX_BUFFER_SIZE)?;
        }
        Ok(Arc::new(descriptor.unwrap_or_else(|| RowDescriptor::with_capacity(0))))
    }

    /// One reply buffer. Returns `Some(index)` of the last complete
    /// variable when the buffer was truncated mid stream.
    fn parse_info_block(
        &mut self,
        buffer: &[u8],
        descriptor: &mut Option<RowDescriptor>,
    ) -> Result<Option<i32>> {
        let mut pos = 0;
        let mut lastindex = 0i32;
        let mut index = 0usize;

        let read_len = |buffer: &[u8], pos: usize| -> Result<usize> {
            if pos + 2 > buffer.len() {
                return Err(protocol!("describe reply ends inside an item").into());
            }
            Ok(vax_integer(buffer, pos, 2) as usize)
        };

        while pos < buffer.len() && buffer[pos] != ISC_INFO_END {
            let item = buffer[pos];
            pos += 1;
            match item {
                ISC_INFO_TRUNCATED => return Ok(Some(lastindex)),
                ISC_INFO_SQL_SELECT | ISC_INFO_SQL_BIND => {
                    // followed by describe_vars carrying the count
                    if pos >= buffer.len() || buffer[pos] != ISC_INFO_SQL_DESCRIBE_VARS {
                        return Err(protocol!("describe reply missing variable count").into());
                    }
                    pos += 1;
                    let len = read_len(buffer, pos)?;
                    pos += 2;
                    let count = vax_integer(buffer, pos, len);
                    pos += len;
                    if descriptor.is_none() {
                        *descriptor = Some(RowDescriptor::with_capacity(count as usize));
                    }
                }
                ISC_INFO_SQL_DESCRIBE_END => {}
                _ => {
                    let len = read_len(buffer, pos)?;
                    pos += 2;
                    if pos + len > buffer.len() {
                        return Err(protocol!("describe reply ends inside an item").into());
                    }
                    let value = &buffer[pos..pos + len];
                    pos += len;

                    if item == ISC_INFO_SQL_STMT_TYPE {
                        let code = vax_integer(value, 0, len);
                        self.statement_type = StatementType::from_code(code)?;
                        continue;
                    }

                    let field = descriptor
                        .as_mut()
                        .and_then(|d| d.field_mut(index.wrapping_sub(1)));
                    match item {
                        ISC_INFO_SQL_SQLDA_SEQ => {
                            lastindex = vax_integer(value, 0, len);
                            index = lastindex as usize;
                            if descriptor
                                .as_ref()
                                .map_or(true, |d| index == 0 || index > d.len())
                            {
                                return Err(protocol!("variable index out of range").into());
                            }
                        }
                        ISC_INFO_SQL_TYPE => {
                            if let Some(f) = field {
                                f.set_type(vax_integer(value, 0, len));
                            }
                        }
                        ISC_INFO_SQL_SUB_TYPE => {
                            if let Some(f) = field {
                                f.set_subtype(vax_integer(value, 0, len));
                            }
                        }
                        ISC_INFO_SQL_SCALE => {
                            if let Some(f) = field {
                                f.set_scale(vax_integer(value, 0, len));
                            }
                        }
                        ISC_INFO_SQL_LENGTH => {
                            if let Some(f) = field {
                                f.set_length(vax_integer(value, 0, len));
                            }
                        }
                        ISC_INFO_SQL_FIELD => {
                            if let Some(f) = field {
                                f.name = String::from_utf8_lossy(value).into_owned();
                            }
                        }
                        ISC_INFO_SQL_RELATION => {
                            if let Some(f) = field {
                                f.relation = String::from_utf8_lossy(value).into_owned();
                            }
                        }
                        ISC_INFO_SQL_OWNER => {
                            if let Some(f) = field {
                                f.owner = String::from_utf8_lossy(value).into_owned();
                            }
                        }
                        ISC_INFO_SQL_ALIAS => {
                            if let Some(f) = field {
                                f.alias = String::from_utf8_lossy(value).into_owned();
                            }
                        }
                        _ => return Err(GdsError::raise(ISC_DSQL_SQLDA_ERR, &[]).into()),
                    }
                }
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("handle", &self.handle)
            .field("statement_type", &self.statement_type)
            .finish_non_exhaustive()
    }
}

fn read_row(att: &mut Attachment, descriptor: &Arc<RowDescriptor>) -> Result<Row> {
    let mut values = Vec::with_capacity(descriptor.len());
    for field in descriptor.fields() {
        values.push(read_value(att.stream(), field)?);
    }
    Ok(Row::new(descriptor.clone(), values))
}

/// Wrap stream failures mid fetch as a network read error.
fn state_error(state: StatementState, required: &'static str) -> crate::Error {
    StateError::Statement { state: state.name(), required }.into()
}

fn read_err(err: crate::Error) -> crate::Error {
    if err.is_io() {
        GdsError::raise(ISC_NET_READ_ERR, &[]).into()
    } else {
        err
    }
}

/// Message format describing one row on the wire. Each variable is its
/// type slot followed by a 16 bit null indicator slot.
fn build_blr(descriptor: &RowDescriptor) -> Result<Vec<u8>> {
    let count = descriptor.len();
    let mut blr = Vec::with_capacity(8 + count * 4);
    blr.push(BLR_VERSION5);
    blr.push(BLR_BEGIN);
    blr.push(BLR_MESSAGE);
    blr.push(0);
    let slots = count * 2;
    blr.push((slots & 255) as u8);
    blr.push((slots >> 8) as u8);

    for field in descriptor.fields() {
        let scale = field.scale() as i8 as u8;
        let length = field.length() as u16;
        match field.sql_type() {
            SQL_VARYING => {
                blr.push(BLR_VARYING);
                blr.extend_from_slice(&length.to_le_bytes());
            }
            SQL_TEXT => {
                blr.push(BLR_TEXT);
                blr.extend_from_slice(&length.to_le_bytes());
            }
            SQL_DOUBLE => blr.push(BLR_DOUBLE),
            SQL_FLOAT => blr.push(BLR_FLOAT),
            SQL_D_FLOAT => blr.push(BLR_D_FLOAT),
            SQL_SHORT => {
                blr.push(BLR_SHORT);
                blr.push(scale);
            }
            SQL_LONG => {
                blr.push(BLR_LONG);
                blr.push(scale);
            }
            SQL_QUAD => {
                blr.push(BLR_QUAD);
                blr.push(scale);
            }
            SQL_INT64 => {
                blr.push(BLR_INT64);
                blr.push(scale);
            }
            SQL_TIMESTAMP => blr.push(BLR_TIMESTAMP),
            SQL_TYPE_DATE => blr.push(BLR_SQL_DATE),
            SQL_TYPE_TIME => blr.push(BLR_SQL_TIME),
            SQL_BLOB | SQL_ARRAY => {
                blr.push(BLR_QUAD);
                blr.push(0);
            }
            _ => return Err(GdsError::raise(ISC_DSQL_SQLDA_ERR, &[]).into()),
        }
        // null indicator slot
        blr.push(BLR_SHORT);
        blr.push(0);
    }

    blr.push(BLR_END);
    blr.push(BLR_EOC);
    Ok(blr)
}

fn parse_records(buffer: &[u8]) -> Result<RecordsAffected> {
    let mut records = RecordsAffected::default();
    let mut pos = 0;
    while pos < buffer.len() && buffer[pos] != ISC_INFO_END {
        let item = buffer[pos];
        pos += 1;
        if item != ISC_INFO_SQL_RECORDS || pos + 2 > buffer.len() {
            return Err(protocol!("malformed records info reply").into());
        }
        let outer_len = vax_integer(buffer, pos, 2) as usize;
        pos += 2;
        let end = pos + outer_len;
        if end > buffer.len() {
            return Err(protocol!("malformed records info reply").into());
        }
        while pos < end && buffer[pos] != ISC_INFO_END {
            let kind = buffer[pos];
            pos += 1;
            if pos + 2 > end {
                return Err(protocol!("malformed records info reply").into());
            }
            let len = vax_integer(buffer, pos, 2) as usize;
            pos += 2;
            if pos + len > end {
                return Err(protocol!("malformed records info reply").into());
            }
            let value = vax_integer(buffer, pos, len);
            pos += len;
            match kind {
                ISC_INFO_REQ_SELECT_COUNT => records.selected = value,
                ISC_INFO_REQ_INSERT_COUNT => records.inserted = value,
                ISC_INFO_REQ_UPDATE_COUNT => records.updated = value,
                ISC_INFO_REQ_DELETE_COUNT => records.deleted = value,
                _ => return Err(protocol!("malformed records info reply").into()),
            }
        }
        pos = end;
    }
    Ok(records)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::net::mock::MockSocket;
    use crate::testutil::*;
    use crate::transaction::IsolationLevel;

    fn push_item(buf: &mut Vec<u8>, tag: u8, payload: &[u8]) {
        buf.push(tag);
        buf.push(payload.len() as u8);
        buf.push(0);
        buf.extend_from_slice(payload);
    }

    fn push_int_item(buf: &mut Vec<u8>, tag: u8, value: i32) {
        push_item(buf, tag, &value.to_le_bytes());
    }

    fn describe_var(buf: &mut Vec<u8>, seq: i32, sql_type: i32, length: i32, alias: &str) {
        push_int_item(buf, ISC_INFO_SQL_SQLDA_SEQ, seq);
        push_int_item(buf, ISC_INFO_SQL_TYPE, sql_type);
        push_int_item(buf, ISC_INFO_SQL_SUB_TYPE, 0);
        push_int_item(buf, ISC_INFO_SQL_SCALE, 0);
        push_int_item(buf, ISC_INFO_SQL_LENGTH, length);
        push_item(buf, ISC_INFO_SQL_ALIAS, alias.as_bytes());
        buf.push(ISC_INFO_SQL_DESCRIBE_END);
    }

    fn select_header(buf: &mut Vec<u8>, count: i32) {
        push_int_item(buf, ISC_INFO_SQL_STMT_TYPE, ISC_INFO_SQL_STMT_SELECT);
        buf.push(ISC_INFO_SQL_SELECT);
        push_item_raw_count(buf, count);
    }

    fn push_item_raw_count(buf: &mut Vec<u8>, count: i32) {
        buf.push(ISC_INFO_SQL_DESCRIBE_VARS);
        buf.push(4);
        buf.push(0);
        buf.extend_from_slice(&count.to_le_bytes());
    }

    fn allocated_statement(mock: &MockSocket, db: &crate::DbAttachment) -> Statement {
        mock.push_input(&ok_response(7));
        Statement::new(db).unwrap()
    }

    #[test]
    fn prepare_parses_type_and_columns() {
        let mock = MockSocket::new();
        let db = test_db(&mock);
        let mut stmt = allocated_statement(&mock, &db);

        mock.push_input(&ok_response(3));
        let tx = db.start_transaction(IsolationLevel::default()).unwrap();

        let mut info = Vec::new();
        select_header(&mut info, 2);
        describe_var(&mut info, 1, SQL_VARYING | 1, 20, "NAME");
        describe_var(&mut info, 2, SQL_LONG, 4, "ID");
        info.push(ISC_INFO_END);
        mock.push_input(&response_with_data(0, &info));
        stmt.prepare(&tx, "select name, id from people").unwrap();

        assert_eq!(stmt.statement_type(), StatementType::Select);
        assert_eq!(stmt.fields().len(), 2);
        let name = stmt.fields().field(0).unwrap();
        assert_eq!(name.sql_type(), SQL_VARYING);
        assert_eq!(name.alias, "NAME");
        assert!(name.allows_null());
        let id = stmt.fields().field(1).unwrap();
        assert_eq!(id.sql_type(), SQL_LONG);
        assert!(!id.allows_null());
    }

    #[test]
    fn reprepare_drops_and_reallocates_the_handle() {
        let mock = MockSocket::new();
        let db = test_db(&mock);
        let mut stmt = allocated_statement(&mock, &db);

        mock.push_input(&ok_response(3));
        let tx = db.start_transaction(IsolationLevel::default()).unwrap();

        let mut info = Vec::new();
        select_header(&mut info, 1);
        describe_var(&mut info, 1, SQL_LONG, 4, "ID");
        info.push(ISC_INFO_END);
        mock.push_input(&response_with_data(0, &info));
        stmt.prepare(&tx, "select id from people").unwrap();
        assert_eq!(stmt.handle(), 7);

        // second prepare frees handle 7, allocates 8, compiles on it
        mock.push_input(&ok_response(0));
        mock.push_input(&ok_response(8));
        let mut info = Vec::new();
        select_header(&mut info, 1);
        describe_var(&mut info, 1, SQL_VARYING | 1, 20, "NAME");
        info.push(ISC_INFO_END);
        mock.push_input(&response_with_data(0, &info));
        stmt.prepare(&tx, "select name from people").unwrap();

        assert_eq!(stmt.handle(), 8);
        assert_eq!(stmt.fields().field(0).unwrap().alias, "NAME");

        let written = mock.written();
        let mut free = Vec::new();
        push_i32(&mut free, OP_FREE_STATEMENT);
        push_i32(&mut free, 7);
        push_i32(&mut free, DSQL_DROP);
        assert!(written.windows(free.len()).any(|w| w == &free[..]));
    }

    #[test]
    fn truncated_describe_is_rerequested() {
        let mock = MockSocket::new();
        let db = test_db(&mock);
        let mut stmt = allocated_statement(&mock, &db);

        mock.push_input(&ok_response(3));
        let tx = db.start_transaction(IsolationLevel::default()).unwrap();

        // first reply carries variable 1 then cuts off
        let mut first = Vec::new();
        select_header(&mut first, 2);
        describe_var(&mut first, 1, SQL_LONG, 4, "A");
        first.push(ISC_INFO_TRUNCATED);
        mock.push_input(&response_with_data(0, &first));

        // continuation reply with the remaining variable
        let mut second = Vec::new();
        second.push(ISC_INFO_SQL_SELECT);
        push_item_raw_count(&mut second, 2);
        describe_var(&mut second, 2, SQL_LONG, 4, "B");
        second.push(ISC_INFO_END);
        mock.push_input(&response_with_data(0, &second));

        stmt.prepare(&tx, "select a, b from t").unwrap();

        assert_eq!(stmt.fields().len(), 2);
        assert_eq!(stmt.fields().field(0).unwrap().alias, "A");
        assert_eq!(stmt.fields().field(1).unwrap().alias, "B");

        // the continuation request restarts one variable early
        let written = mock.written();
        let marker = [ISC_INFO_SQL_SQLDA_START, 2, 0, 0];
        assert!(written.windows(4).any(|w| w == marker));
    }

    #[test]
    fn message_blr_layout() {
        let mut descriptor = RowDescriptor::with_capacity(2);
        {
            let f = descriptor.field_mut(0).unwrap();
            f.set_type(SQL_VARYING | 1);
            f.set_length(20);
        }
        {
            let f = descriptor.field_mut(1).unwrap();
            f.set_type(SQL_LONG);
            f.set_scale(-2);
            f.set_length(4);
        }

        let blr = build_blr(&descriptor).unwrap();
        assert_eq!(
            blr,
            [
                BLR_VERSION5, BLR_BEGIN, BLR_MESSAGE, 0, 4, 0,
                BLR_VARYING, 20, 0, BLR_SHORT, 0,
                BLR_LONG, 0xfe, BLR_SHORT, 0,
                BLR_END, BLR_EOC,
            ],
        );
    }

    #[test]
    fn fetch_drains_batches_then_signals_eof() {
        let mock = MockSocket::new();
        let db = test_db(&mock);
        let mut stmt = allocated_statement(&mock, &db);

        mock.push_input(&ok_response(3));
        let mut tx = db.start_transaction(IsolationLevel::default()).unwrap();

        let mut info = Vec::new();
        select_header(&mut info, 1);
        describe_var(&mut info, 1, SQL_LONG, 4, "N");
        info.push(ISC_INFO_END);
        mock.push_input(&response_with_data(0, &info));
        stmt.prepare(&tx, "select n from t").unwrap();

        mock.push_input(&ok_response(0));
        stmt.execute(&mut tx, &[]).unwrap();

        // two rows, each its own op_fetch_response, then eof
        let mut input = Vec::new();
        for n in [5i32, 6] {
            push_i32(&mut input, OP_FETCH_RESPONSE);
            push_i32(&mut input, 0);
            push_i32(&mut input, 1);
            push_i32(&mut input, n);
            push_i32(&mut input, 0); // null indicator
        }
        push_i32(&mut input, OP_FETCH_RESPONSE);
        push_i32(&mut input, 100);
        push_i32(&mut input, 0);
        mock.push_input(&input);

        let row = stmt.fetch().unwrap().unwrap();
        assert_eq!(row.get(0), Some(&SqlValue::Integer { value: 5, scale: 0 }));
        let row = stmt.fetch().unwrap().unwrap();
        assert_eq!(row.get_by_name("N"), Some(&SqlValue::Integer { value: 6, scale: 0 }));
        assert!(stmt.fetch().unwrap().is_none());
        // exhausted cursors answer without another round trip
        let written = mock.written().len();
        assert!(stmt.fetch().unwrap().is_none());
        assert_eq!(mock.written().len(), written);
    }

    #[test]
    fn fetch_before_execute_is_a_state_error() {
        let mock = MockSocket::new();
        let db = test_db(&mock);
        let mut stmt = allocated_statement(&mock, &db);
        let err = stmt.fetch().unwrap_err();
        assert!(matches!(err.kind(), crate::ErrorKind::State(_)));
    }

    #[test]
    fn execute_before_prepare_is_a_state_error() {
        let mock = MockSocket::new();
        let db = test_db(&mock);
        let mut stmt = allocated_statement(&mock, &db);
        mock.push_input(&ok_response(3));
        let mut tx = db.start_transaction(IsolationLevel::default()).unwrap();

        let before = mock.written().len();
        let err = stmt.execute(&mut tx, &[]).unwrap_err();
        assert!(matches!(err.kind(), crate::ErrorKind::State(_)));
        assert_eq!(mock.written().len(), before);
    }

    #[test]
    fn io_failure_during_prepare_is_wrapped() {
        let mock = MockSocket::new();
        let db = test_db(&mock);
        let mut stmt = allocated_statement(&mock, &db);
        mock.push_input(&ok_response(3));
        let tx = db.start_transaction(IsolationLevel::default()).unwrap();

        // no scripted reply, the response read hits end of stream
        let err = stmt.prepare(&tx, "select 1 from rdb$database").unwrap_err();
        assert_eq!(err.gds_code(), Some(ISC_NET_READ_ERR));
    }

    #[test]
    fn io_failure_during_execute_poisons_the_statement() {
        let mock = MockSocket::new();
        let db = test_db(&mock);
        let mut stmt = allocated_statement(&mock, &db);
        mock.push_input(&ok_response(3));
        let mut tx = db.start_transaction(IsolationLevel::default()).unwrap();

        let mut info = Vec::new();
        select_header(&mut info, 1);
        describe_var(&mut info, 1, SQL_LONG, 4, "N");
        info.push(ISC_INFO_END);
        mock.push_input(&response_with_data(0, &info));
        stmt.prepare(&tx, "select n from t").unwrap();

        let err = stmt.execute(&mut tx, &[]).unwrap_err();
        assert_eq!(err.gds_code(), Some(ISC_NET_READ_ERR));
        // the stream is no longer trustworthy, later calls stay local
        let err = stmt.execute(&mut tx, &[]).unwrap_err();
        assert!(matches!(err.kind(), crate::ErrorKind::State(_)));
    }

    #[test]
    fn truncated_records_reply_is_a_protocol_error() {
        let buffer = [ISC_INFO_SQL_RECORDS, 2, 0, ISC_INFO_REQ_UPDATE_COUNT, 9];
        let err = parse_records(&buffer).unwrap_err();
        assert!(matches!(err.kind(), crate::ErrorKind::Protocol(_)));
    }

    #[test]
    fn commit_resets_open_cursors() {
        let mock = MockSocket::new();
        let db = test_db(&mock);
        let mut stmt = allocated_statement(&mock, &db);

        mock.push_input(&ok_response(3));
        let mut tx = db.start_transaction(IsolationLevel::default()).unwrap();

        let mut info = Vec::new();
        select_header(&mut info, 1);
        describe_var(&mut info, 1, SQL_LONG, 4, "N");
        info.push(ISC_INFO_END);
        mock.push_input(&response_with_data(0, &info));
        stmt.prepare(&tx, "select n from t").unwrap();
        mock.push_input(&ok_response(0));
        stmt.execute(&mut tx, &[]).unwrap();

        mock.push_input(&ok_response(0));
        tx.commit().unwrap();

        let err = stmt.fetch().unwrap_err();
        assert!(matches!(err.kind(), crate::ErrorKind::State(_)));
    }

    #[test]
    fn records_affected_reply() {
        let mut buffer = Vec::new();
        buffer.push(ISC_INFO_SQL_RECORDS);
        let mut inner = Vec::new();
        push_int_item(&mut inner, ISC_INFO_REQ_UPDATE_COUNT, 3);
        push_int_item(&mut inner, ISC_INFO_REQ_DELETE_COUNT, 0);
        push_int_item(&mut inner, ISC_INFO_REQ_SELECT_COUNT, 0);
        push_int_item(&mut inner, ISC_INFO_REQ_INSERT_COUNT, 1);
        inner.push(ISC_INFO_END);
        buffer.push(inner.len() as u8);
        buffer.push(0);
        buffer.extend_from_slice(&inner);
        buffer.push(ISC_INFO_END);

        let records = parse_records(&buffer).unwrap();
        assert_eq!(records.updated, 3);
        assert_eq!(records.inserted, 1);
        assert_eq!(records.total(), 4);
    }

    #[test]
    fn execution_plan_skips_leading_newline() {
        let mock = MockSocket::new();
        let db = test_db(&mock);
        let stmt = allocated_statement(&mock, &db);

        let plan = "\nPLAN (T NATURAL)";
        let mut info = Vec::new();
        info.push(ISC_INFO_SQL_GET_PLAN);
        info.extend_from_slice(&(plan.len() as u16).to_le_bytes());
        info.extend_from_slice(plan.as_bytes());
        info.push(ISC_INFO_END);
        mock.push_input(&response_with_data(0, &info));

        assert_eq!(stmt.execution_plan().unwrap(), "PLAN (T NATURAL)");
    }
}
