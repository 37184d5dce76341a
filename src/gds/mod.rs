//! GDS protocol constant space.
//!
//! Values match the canonical InterBase/Firebird `ibase.h` definitions.
//! Operation codes and error codes travel as big endian `i32`, parameter
//! buffer tags and info items as single bytes.

pub mod msgs;

// Protocol negotiation

pub const PROTOCOL_VERSION10: i32 = 10;
pub const CONNECT_VERSION2: i32 = 2;
pub const ARCH_GENERIC: i32 = 1;

pub const P_REQ_ASYNC: i32 = 1;

/// Attach identification tags inside the `op_connect` user id block.
pub const CNCT_USER: u8 = 1;
pub const CNCT_HOST: u8 = 4;
pub const CNCT_USER_VERIFICATION: u8 = 6;

// Operation codes

pub const OP_VOID: i32 = 0;
pub const OP_CONNECT: i32 = 1;
pub const OP_EXIT: i32 = 2;
pub const OP_ACCEPT: i32 = 3;
pub const OP_REJECT: i32 = 4;
pub const OP_DISCONNECT: i32 = 6;
pub const OP_RESPONSE: i32 = 9;
pub const OP_ATTACH: i32 = 19;
pub const OP_CREATE: i32 = 20;
pub const OP_DETACH: i32 = 21;
pub const OP_TRANSACTION: i32 = 29;
pub const OP_COMMIT: i32 = 30;
pub const OP_ROLLBACK: i32 = 31;
pub const OP_PREPARE: i32 = 32;
pub const OP_PREPARE2: i32 = 33;
pub const OP_CREATE_BLOB: i32 = 34;
pub const OP_OPEN_BLOB: i32 = 35;
pub const OP_GET_SEGMENT: i32 = 36;
pub const OP_PUT_SEGMENT: i32 = 37;
pub const OP_CANCEL_BLOB: i32 = 38;
pub const OP_CLOSE_BLOB: i32 = 39;
pub const OP_INFO_DATABASE: i32 = 40;
pub const OP_BATCH_SEGMENTS: i32 = 44;
pub const OP_QUE_EVENTS: i32 = 48;
pub const OP_CANCEL_EVENTS: i32 = 49;
pub const OP_COMMIT_RETAINING: i32 = 50;
pub const OP_EVENT: i32 = 52;
pub const OP_CONNECT_REQUEST: i32 = 53;
pub const OP_OPEN_BLOB2: i32 = 56;
pub const OP_CREATE_BLOB2: i32 = 57;
pub const OP_GET_SLICE: i32 = 58;
pub const OP_PUT_SLICE: i32 = 59;
pub const OP_SLICE: i32 = 60;
pub const OP_SEEK_BLOB: i32 = 61;
pub const OP_ALLOCATE_STATEMENT: i32 = 62;
pub const OP_EXECUTE: i32 = 63;
pub const OP_FETCH: i32 = 65;
pub const OP_FETCH_RESPONSE: i32 = 66;
pub const OP_FREE_STATEMENT: i32 = 67;
pub const OP_PREPARE_STATEMENT: i32 = 68;
pub const OP_SET_CURSOR: i32 = 69;
pub const OP_INFO_SQL: i32 = 70;
pub const OP_DUMMY: i32 = 71;
pub const OP_EXECUTE2: i32 = 76;
pub const OP_SQL_RESPONSE: i32 = 78;
pub const OP_DROP_DATABASE: i32 = 81;
pub const OP_SERVICE_ATTACH: i32 = 82;
pub const OP_SERVICE_DETACH: i32 = 83;
pub const OP_SERVICE_INFO: i32 = 84;
pub const OP_SERVICE_START: i32 = 85;
pub const OP_ROLLBACK_RETAINING: i32 = 86;

// Free statement options

pub const DSQL_CLOSE: i32 = 1;
pub const DSQL_DROP: i32 = 2;

// Response blob state bits (op_get_segment object handle)

pub const RBL_SEGMENT: i32 = 2;
pub const RBL_EOF_PENDING: i32 = 4;

/// Info request reply buffer size for prepare/describe exchanges.
pub const MAX_BUFFER_SIZE: i32 = 1024;

pub const SQL_DIALECT_V5: i32 = 1;
pub const SQL_DIALECT_V6: i32 = 3;
pub const SQL_DIALECT_CURRENT: i32 = SQL_DIALECT_V6;

// SQL data types as carried in describe info (nullable bit in bit 0)

pub const SQL_TEXT: i32 = 452;
pub const SQL_VARYING: i32 = 448;
pub const SQL_SHORT: i32 = 500;
pub const SQL_LONG: i32 = 496;
pub const SQL_FLOAT: i32 = 482;
pub const SQL_DOUBLE: i32 = 480;
pub const SQL_D_FLOAT: i32 = 530;
pub const SQL_TIMESTAMP: i32 = 510;
pub const SQL_BLOB: i32 = 520;
pub const SQL_ARRAY: i32 = 540;
pub const SQL_QUAD: i32 = 550;
pub const SQL_TYPE_TIME: i32 = 560;
pub const SQL_TYPE_DATE: i32 = 570;
pub const SQL_INT64: i32 = 580;

// Database parameter buffer

pub const ISC_DPB_VERSION1: u8 = 1;
pub const ISC_DPB_PAGE_SIZE: u8 = 4;
pub const ISC_DPB_USER_NAME: u8 = 28;
pub const ISC_DPB_PASSWORD: u8 = 29;
pub const ISC_DPB_LC_CTYPE: u8 = 48;
pub const ISC_DPB_CONNECT_TIMEOUT: u8 = 57;
pub const ISC_DPB_DUMMY_PACKET_INTERVAL: u8 = 58;
pub const ISC_DPB_SQL_ROLE_NAME: u8 = 60;
pub const ISC_DPB_SQL_DIALECT: u8 = 63;
pub const ISC_DPB_FORCE_WRITE: u8 = 24;
pub const ISC_DPB_OVERWRITE: u8 = 54;

// Transaction parameter buffer

pub const ISC_TPB_VERSION3: u8 = 3;
pub const ISC_TPB_CONSISTENCY: u8 = 1;
pub const ISC_TPB_CONCURRENCY: u8 = 2;
pub const ISC_TPB_WAIT: u8 = 6;
pub const ISC_TPB_NOWAIT: u8 = 7;
pub const ISC_TPB_READ: u8 = 8;
pub const ISC_TPB_WRITE: u8 = 9;
pub const ISC_TPB_READ_COMMITTED: u8 = 15;
pub const ISC_TPB_REC_VERSION: u8 = 17;
pub const ISC_TPB_NO_REC_VERSION: u8 = 18;

// Service parameter buffer

pub const ISC_SPB_VERSION1: u8 = 1;
pub const ISC_SPB_CURRENT_VERSION: u8 = 2;
pub const ISC_SPB_USER_NAME: u8 = 28;
pub const ISC_SPB_PASSWORD: u8 = 29;
pub const ISC_ACTION_SVC_BACKUP: u8 = 1;
pub const ISC_ACTION_SVC_RESTORE: u8 = 2;
pub const ISC_ACTION_SVC_REPAIR: u8 = 3;
pub const ISC_ACTION_SVC_PROPERTIES: u8 = 8;
pub const ISC_ACTION_SVC_DB_STATS: u8 = 11;

pub const ISC_SPB_COMMAND_LINE: u8 = 105;
pub const ISC_SPB_DBNAME: u8 = 106;
pub const ISC_SPB_VERBOSE: u8 = 107;
pub const ISC_SPB_OPTIONS: u8 = 108;

// Blob parameter buffer

pub const ISC_BPB_VERSION1: u8 = 1;
pub const ISC_BPB_SOURCE_TYPE: u8 = 1;
pub const ISC_BPB_TARGET_TYPE: u8 = 2;
pub const ISC_BPB_TYPE: u8 = 3;
pub const ISC_BPB_TYPE_SEGMENTED: u8 = 0;
pub const ISC_BPB_TYPE_STREAM: u8 = 1;

// Event parameter buffer

pub const EPB_VERSION1: u8 = 1;

// Info items

pub const ISC_INFO_END: u8 = 1;
pub const ISC_INFO_TRUNCATED: u8 = 2;
pub const ISC_INFO_ERROR: u8 = 3;

pub const ISC_INFO_DB_ID: u8 = 4;
pub const ISC_INFO_PAGE_SIZE: u8 = 14;
pub const ISC_INFO_ODS_VERSION: u8 = 32;
pub const ISC_INFO_USER_NAMES: u8 = 53;

pub const ISC_INFO_SQL_SELECT: u8 = 4;
pub const ISC_INFO_SQL_BIND: u8 = 5;
pub const ISC_INFO_SQL_NUM_VARIABLES: u8 = 6;
pub const ISC_INFO_SQL_DESCRIBE_VARS: u8 = 7;
pub const ISC_INFO_SQL_DESCRIBE_END: u8 = 8;
pub const ISC_INFO_SQL_SQLDA_SEQ: u8 = 9;
pub const ISC_INFO_SQL_TYPE: u8 = 11;
pub const ISC_INFO_SQL_SUB_TYPE: u8 = 12;
pub const ISC_INFO_SQL_SCALE: u8 = 13;
pub const ISC_INFO_SQL_LENGTH: u8 = 14;
pub const ISC_INFO_SQL_FIELD: u8 = 16;
pub const ISC_INFO_SQL_RELATION: u8 = 17;
pub const ISC_INFO_SQL_OWNER: u8 = 18;
pub const ISC_INFO_SQL_ALIAS: u8 = 19;
pub const ISC_INFO_SQL_SQLDA_START: u8 = 20;
pub const ISC_INFO_SQL_STMT_TYPE: u8 = 21;
pub const ISC_INFO_SQL_GET_PLAN: u8 = 22;
pub const ISC_INFO_SQL_RECORDS: u8 = 23;

pub const ISC_INFO_REQ_SELECT_COUNT: u8 = 13;
pub const ISC_INFO_REQ_INSERT_COUNT: u8 = 14;
pub const ISC_INFO_REQ_UPDATE_COUNT: u8 = 15;
pub const ISC_INFO_REQ_DELETE_COUNT: u8 = 16;

pub const ISC_INFO_SVC_SERVER_VERSION: u8 = 55;
pub const ISC_INFO_SVC_LINE: u8 = 62;
pub const ISC_INFO_SVC_TO_EOF: u8 = 63;

// Statement types reported by isc_info_sql_stmt_type

pub const ISC_INFO_SQL_STMT_SELECT: i32 = 1;
pub const ISC_INFO_SQL_STMT_INSERT: i32 = 2;
pub const ISC_INFO_SQL_STMT_UPDATE: i32 = 3;
pub const ISC_INFO_SQL_STMT_DELETE: i32 = 4;
pub const ISC_INFO_SQL_STMT_DDL: i32 = 5;
pub const ISC_INFO_SQL_STMT_GET_SEGMENT: i32 = 6;
pub const ISC_INFO_SQL_STMT_PUT_SEGMENT: i32 = 7;
pub const ISC_INFO_SQL_STMT_EXEC_PROCEDURE: i32 = 8;
pub const ISC_INFO_SQL_STMT_START_TRANS: i32 = 9;
pub const ISC_INFO_SQL_STMT_COMMIT: i32 = 10;
pub const ISC_INFO_SQL_STMT_ROLLBACK: i32 = 11;
pub const ISC_INFO_SQL_STMT_SELECT_FOR_UPD: i32 = 12;
pub const ISC_INFO_SQL_STMT_SET_GENERATOR: i32 = 13;
pub const ISC_INFO_SQL_STMT_SAVEPOINT: i32 = 14;

// BLR codes

pub const BLR_VERSION5: u8 = 5;
pub const BLR_BEGIN: u8 = 2;
pub const BLR_MESSAGE: u8 = 4;
pub const BLR_EOC: u8 = 76;
pub const BLR_END: u8 = 255;

pub const BLR_TEXT: u8 = 14;
pub const BLR_SHORT: u8 = 7;
pub const BLR_LONG: u8 = 8;
pub const BLR_QUAD: u8 = 9;
pub const BLR_INT64: u8 = 16;
pub const BLR_FLOAT: u8 = 10;
pub const BLR_DOUBLE: u8 = 27;
pub const BLR_D_FLOAT: u8 = 11;
pub const BLR_TIMESTAMP: u8 = 35;
pub const BLR_VARYING: u8 = 37;
pub const BLR_SQL_DATE: u8 = 12;
pub const BLR_SQL_TIME: u8 = 13;
pub const BLR_BLOB: i32 = 261;

// Array slice description language

pub const ISC_SDL_VERSION1: u8 = 1;
pub const ISC_SDL_EOC: u8 = 255;
pub const ISC_SDL_RELATION: u8 = 2;
pub const ISC_SDL_FIELD: u8 = 4;
pub const ISC_SDL_STRUCT: u8 = 6;
pub const ISC_SDL_VARIABLE: u8 = 7;
pub const ISC_SDL_SCALAR: u8 = 8;
pub const ISC_SDL_TINY_INTEGER: u8 = 9;
pub const ISC_SDL_SHORT_INTEGER: u8 = 10;
pub const ISC_SDL_LONG_INTEGER: u8 = 11;
pub const ISC_SDL_DO2: u8 = 34;
pub const ISC_SDL_DO1: u8 = 35;
pub const ISC_SDL_ELEMENT: u8 = 36;

// Internal raw field type codes from RDB$FIELDS.RDB$FIELD_TYPE

pub const BLR_FIELD_TEXT: i32 = 14;
pub const BLR_FIELD_VARYING: i32 = 37;
pub const BLR_FIELD_CSTRING: i32 = 40;
pub const BLR_FIELD_SHORT: i32 = 7;
pub const BLR_FIELD_LONG: i32 = 8;
pub const BLR_FIELD_QUAD: i32 = 9;
pub const BLR_FIELD_INT64: i32 = 16;
pub const BLR_FIELD_FLOAT: i32 = 10;
pub const BLR_FIELD_DOUBLE: i32 = 27;
pub const BLR_FIELD_D_FLOAT: i32 = 11;
pub const BLR_FIELD_TIMESTAMP: i32 = 35;
pub const BLR_FIELD_SQL_DATE: i32 = 12;
pub const BLR_FIELD_SQL_TIME: i32 = 13;
pub const BLR_FIELD_BLOB: i32 = 261;

// Status vector argument types

pub const ISC_ARG_END: i32 = 0;
pub const ISC_ARG_GDS: i32 = 1;
pub const ISC_ARG_STRING: i32 = 2;
pub const ISC_ARG_CSTRING: i32 = 3;
pub const ISC_ARG_NUMBER: i32 = 4;
pub const ISC_ARG_INTERPRETED: i32 = 5;
pub const ISC_ARG_SQL_STATE: i32 = 19;
pub const ISC_ARG_WARNING: i32 = 18;

// ISC error codes raised or matched by this crate

pub const ISC_ARITH_EXCEPT: i32 = 335544321;
pub const ISC_OPEN_TRANS: i32 = 335544357;
pub const ISC_SEGMENT: i32 = 335544366;
pub const ISC_SEGSTR_EOF: i32 = 335544367;
pub const ISC_CONNECT_REJECT: i32 = 335544421;
pub const ISC_INVALID_DIMENSION: i32 = 335544458;
pub const ISC_TRA_STATE: i32 = 335544468;
pub const ISC_DSQL_SQLDA_ERR: i32 = 335544583;
pub const ISC_NETWORK_ERROR: i32 = 335544721;
pub const ISC_NET_READ_ERR: i32 = 335544726;
pub const ISC_NET_WRITE_ERR: i32 = 335544727;
