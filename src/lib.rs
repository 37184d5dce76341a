//! InterBase/Firebird wire protocol client
//!
//! Talks the GDS remote protocol over TCP: attach to a database, run
//! SQL in explicit transactions, stream blobs and arrays, listen for
//! server events and drive the service manager.
//!
//! # Examples
//!
//! ```no_run
//! use fbwire::{DbAttachment, IsolationLevel, Statement};
//!
//! # fn app() -> fbwire::Result<()> {
//! let db = DbAttachment::connect(
//!     "database=srv:/data/employee.fdb;user=SYSDBA;password=masterkey".parse()?,
//! )?;
//!
//! let mut tx = db.start_transaction(IsolationLevel::default())?;
//! let mut stmt = Statement::new(&db)?;
//! stmt.prepare(&tx, "SELECT emp_no, full_name FROM employee")?;
//! stmt.execute(&mut tx, &[])?;
//!
//! while let Some(row) = stmt.fetch()? {
//!     let name = row.get_by_name("FULL_NAME");
//!     println!("{name:?}");
//! }
//!
//! stmt.drop_statement()?;
//! tx.commit()?;
//! db.detach()?;
//! # Ok(())
//! # }
//! ```

pub mod common;
mod net;

// Protocol
pub mod gds;
mod wire;

// Encoding
mod charset;
mod value;
pub mod row;

// Component
mod config;
mod attachment;
mod transaction;
mod statement;
pub mod blob;
pub mod array;

// Sideband
pub mod events;
pub mod service;

mod error;

#[cfg(test)]
mod testutil;

pub use attachment::{CreateDatabaseOptions, DbAttachment, WarningSink};
pub use charset::Charset;
pub use config::{AttachParams, ParseError};
pub use row::{Field, Row, RowDescriptor};
pub use statement::{RecordsAffected, Statement, StatementType};
pub use transaction::{IsolationLevel, Transaction, TransactionState};
pub use value::SqlValue;

pub use blob::Blob;
pub use events::EventListener;
pub use service::{ServiceAttachment, ServiceRequest};

pub use error::{Error, ErrorKind, GdsError, ProtocolError, Result, StateError};
