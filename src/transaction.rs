//! Transactions.
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use crate::{
    Result,
    attachment::DbAttachment,
    common::{debug, span},
    error::StateError,
    gds::*,
    statement::Cursor,
    wire::ParamBuffer,
};

/// Isolation level mapped onto transaction parameter buffer tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// `isc_tpb_consistency`, table stability locking.
    Serializable,
    /// `isc_tpb_concurrency`, snapshot.
    RepeatableRead,
    /// Read committed seeing uncommitted record versions.
    ReadUncommitted,
    /// Read committed waiting for concurrent updates to settle.
    #[default]
    ReadCommitted,
}

/// Lifecycle of a transaction handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    NoTransaction,
    Started,
    Prepared,
}

/// A server transaction bound to one attachment.
///
/// Completing the transaction resets every statement cursor opened
/// under it, so stale handles cannot fetch from a dead context.
pub struct Transaction {
    db: DbAttachment,
    handle: i32,
    state: TransactionState,
    isolation: IsolationLevel,
    subscribers: Vec<Weak<Mutex<Cursor>>>,
}

impl Transaction {
    /// A transaction object in `NoTransaction` state.
    pub fn new(db: &DbAttachment, isolation: IsolationLevel) -> Self {
        Self {
            db: db.clone(),
            handle: 0,
            state: TransactionState::NoTransaction,
            isolation,
            subscribers: Vec::new(),
        }
    }

    pub fn handle(&self) -> i32 {
        self.handle
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    fn build_tpb(&self) -> ParamBuffer {
        let mut tpb = ParamBuffer::new(ISC_TPB_VERSION3);
        tpb.append_tag(ISC_TPB_WRITE).append_tag(ISC_TPB_WAIT);

        match self.isolation {
            IsolationLevel::Serializable => {
                tpb.append_tag(ISC_TPB_CONSISTENCY);
            }
            IsolationLevel::RepeatableRead => {
                tpb.append_tag(ISC_TPB_CONCURRENCY);
            }
            IsolationLevel::ReadUncommitted => {
                tpb.append_tag(ISC_TPB_READ_COMMITTED).append_tag(ISC_TPB_REC_VERSION);
            }
            IsolationLevel::ReadCommitted => {
                tpb.append_tag(ISC_TPB_READ_COMMITTED).append_tag(ISC_TPB_NO_REC_VERSION);
            }
        }

        tpb
    }

    /// Start the transaction on the server.
    pub fn begin(&mut self) -> Result<()> {
        span!("begin");
        if self.state != TransactionState::NoTransaction {
            return Err(self.state_error());
        }

        let tpb = self.build_tpb();
        let mut db = self.db.inner.lock();
        db.stream().write_i32(OP_TRANSACTION);
        let db_handle = db.handle();
        db.stream().write_i32(db_handle);
        db.stream().write_buffer(tpb.as_bytes());
        db.stream().flush()?;

        let response = db.receive_response()?;
        self.handle = response.object_handle;
        self.state = TransactionState::Started;
        db.transaction_started();
        debug!("transaction {} started", self.handle);
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        span!("commit");
        if !matches!(self.state, TransactionState::Started | TransactionState::Prepared) {
            return Err(self.state_error());
        }
        self.complete(OP_COMMIT)
    }

    pub fn rollback(&mut self) -> Result<()> {
        span!("rollback");
        if self.state == TransactionState::NoTransaction {
            return Err(self.state_error());
        }
        self.complete(OP_ROLLBACK)
    }

    /// Commit but keep the handle and context alive.
    pub fn commit_retaining(&mut self) -> Result<()> {
        if !matches!(self.state, TransactionState::Started | TransactionState::Prepared) {
            return Err(self.state_error());
        }
        self.retain(OP_COMMIT_RETAINING)
    }

    /// Roll back but keep the handle and context alive.
    pub fn rollback_retaining(&mut self) -> Result<()> {
        if !matches!(self.state, TransactionState::Started | TransactionState::Prepared) {
            return Err(self.state_error());
        }
        self.retain(OP_ROLLBACK_RETAINING)
    }

    /// First phase of a two phase commit.
    pub fn prepare(&mut self) -> Result<()> {
        if self.state != TransactionState::Started {
            return Err(self.state_error());
        }
        let mut db = self.db.inner.lock();
        db.stream().write_i32(OP_PREPARE);
        db.stream().write_i32(self.handle);
        db.stream().flush()?;
        db.receive_response()?;
        drop(db);
        self.state = TransactionState::Prepared;
        Ok(())
    }

    /// First phase of a two phase commit with recovery data.
    pub fn prepare_with(&mut self, recovery: &[u8]) -> Result<()> {
        if self.state != TransactionState::Started {
            return Err(self.state_error());
        }
        let mut db = self.db.inner.lock();
        db.stream().write_i32(OP_PREPARE2);
        db.stream().write_i32(self.handle);
        db.stream().write_buffer(recovery);
        db.stream().flush()?;
        db.receive_response()?;
        drop(db);
        self.state = TransactionState::Prepared;
        Ok(())
    }

    fn complete(&mut self, op: i32) -> Result<()> {
        let mut db = self.db.inner.lock();
        db.stream().write_i32(op);
        db.stream().write_i32(self.handle);
        db.stream().flush()?;
        db.receive_response()?;
        db.transaction_ended();
        drop(db);

        self.state = TransactionState::NoTransaction;
        self.notify_completed();
        Ok(())
    }

    fn retain(&mut self, op: i32) -> Result<()> {
        let mut db = self.db.inner.lock();
        db.stream().write_i32(op);
        db.stream().write_i32(self.handle);
        db.stream().flush()?;
        db.receive_response()?;
        drop(db);
        self.state = TransactionState::Started;
        Ok(())
    }

    /// Statements register their cursor to be reset when the
    /// transaction completes.
    pub(crate) fn register(&mut self, cursor: &Arc<Mutex<Cursor>>) {
        let exists = self
            .subscribers
            .iter()
            .any(|w| w.as_ptr() == Arc::as_ptr(cursor));
        if !exists {
            self.subscribers.push(Arc::downgrade(cursor));
        }
    }

    fn notify_completed(&mut self) {
        for weak in self.subscribers.drain(..) {
            if let Some(cursor) = weak.upgrade() {
                cursor.lock().transaction_completed();
            }
        }
    }

    fn state_error(&self) -> crate::Error {
        StateError::Transaction { handle: self.handle, state: "no valid" }.into()
    }

    pub(crate) fn db(&self) -> &DbAttachment {
        &self.db
    }
}

impl DbAttachment {
    /// Begin a transaction at the given isolation level.
    pub fn start_transaction(&self, isolation: IsolationLevel) -> Result<Transaction> {
        let mut transaction = Transaction::new(self, isolation);
        transaction.begin()?;
        Ok(transaction)
    }
}
