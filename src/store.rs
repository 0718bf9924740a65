//! Transaction persistence behind a pluggable store trait
//!
//! The production implementation is an embedded sled database: records are
//! CBOR-encoded under `txn/<id>` keys, receipt numbers index their
//! transaction under `receipt/<number>`, and the creation sequence lives at
//! `meta/seq`. Store failures surface as the retryable `StoreUnavailable`.
use crate::error::WorkflowError;
use crate::transaction::{TimeStamp, Transaction, TransactionStatus};
use chrono::Utc;
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const TXN_PREFIX: &str = "txn/";
const RECEIPT_PREFIX: &str = "receipt/";
const SEQ_KEY: &[u8] = b"meta/seq";

/// Filter for listings and statistics. All bounds are inclusive; an unset
/// field matches everything.
#[derive(Debug, Default, Clone)]
pub struct TransactionFilter {
    pub client_id: Option<String>,
    pub branch: Option<String>,
    pub created_from: Option<TimeStamp<Utc>>,
    pub created_to: Option<TimeStamp<Utc>>,
}

impl TransactionFilter {
    pub fn matches(&self, txn: &Transaction) -> bool {
        if let Some(client_id) = &self.client_id {
            if txn.client_id() != client_id {
                return false;
            }
        }
        if let Some(branch) = &self.branch {
            if txn.branch() != branch {
                return false;
            }
        }
        if let Some(from) = &self.created_from {
            if txn.created_at().to_datetime_utc() < from.to_datetime_utc() {
                return false;
            }
        }
        if let Some(to) = &self.created_to {
            if txn.created_at().to_datetime_utc() > to.to_datetime_utc() {
                return false;
            }
        }
        true
    }
}

/// Shared flag a caller holds onto to abandon a long store scan.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Durable, queryable backing store for transaction records. The engine is
/// written against this trait; hosts inject whichever implementation their
/// deployment uses.
pub trait TransactionStore: Send + Sync {
    /// Persist a freshly created transaction, rejecting an id already in use.
    fn insert_new(&self, txn: &Transaction) -> Result<(), WorkflowError>;

    /// Persist the current state of an existing transaction. Once this
    /// returns `Ok` the record, audit chain included, must survive a crash.
    fn save(&self, txn: &Transaction) -> Result<(), WorkflowError>;

    fn get(&self, id: &str) -> Result<Transaction, WorkflowError>;

    /// Matching transactions, newest-first by creation time.
    fn list(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, WorkflowError>;

    /// Same as [`list`](Self::list), aborting with `Cancelled` once the
    /// token is flipped.
    fn list_with_cancel(
        &self,
        filter: &TransactionFilter,
        cancel: &CancelToken,
    ) -> Result<Vec<Transaction>, WorkflowError>;

    fn list_by_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, WorkflowError>;

    fn list_by_client(&self, client_id: &str) -> Result<Vec<Transaction>, WorkflowError>;

    /// Advance and return the store-owned creation sequence.
    fn next_sequence(&self) -> Result<u64, WorkflowError>;

    /// Bind a receipt number to a transaction id, rejecting a number that is
    /// already taken.
    fn register_receipt(&self, receipt: &str, txn_id: &str) -> Result<(), WorkflowError>;
}

pub struct SledStore {
    db: Arc<Db>,
}

impl SledStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        let db = sled::open(path).map_err(store_err)?;
        log::debug!("opened sled store with {} live keys", db.len());
        Ok(Self { db: Arc::new(db) })
    }

    fn txn_key(id: &str) -> Vec<u8> {
        format!("{TXN_PREFIX}{id}").into_bytes()
    }

    fn receipt_key(number: &str) -> Vec<u8> {
        format!("{RECEIPT_PREFIX}{number}").into_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<Transaction, WorkflowError> {
        minicbor::decode(bytes).map_err(store_err)
    }

    fn scan(
        &self,
        filter: &TransactionFilter,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<Transaction>, WorkflowError> {
        let mut matches = Vec::new();
        for entry in self.db.scan_prefix(TXN_PREFIX.as_bytes()) {
            if let Some(token) = cancel {
                if token.is_cancelled() {
                    return Err(WorkflowError::Cancelled);
                }
            }
            let (_, value) = entry.map_err(store_err)?;
            let txn = Self::decode(&value)?;
            if filter.matches(&txn) {
                matches.push(txn);
            }
        }
        // newest first; ids carry the creation order and break timestamp ties
        matches.sort_by(|a, b| {
            b.created_at()
                .to_datetime_utc()
                .cmp(&a.created_at().to_datetime_utc())
                .then_with(|| b.id().cmp(a.id()))
        });
        Ok(matches)
    }
}

impl TransactionStore for SledStore {
    fn insert_new(&self, txn: &Transaction) -> Result<(), WorkflowError> {
        let encoded = minicbor::to_vec(txn).map_err(store_err)?;
        let swap = self
            .db
            .compare_and_swap(Self::txn_key(txn.id()), None as Option<&[u8]>, Some(encoded))
            .map_err(store_err)?;
        if swap.is_err() {
            return Err(WorkflowError::DuplicateId(txn.id().to_string()));
        }
        self.db.flush().map_err(store_err)?;
        log::debug!("inserted transaction {}", txn.id());
        Ok(())
    }

    fn save(&self, txn: &Transaction) -> Result<(), WorkflowError> {
        let encoded = minicbor::to_vec(txn).map_err(store_err)?;
        self.db
            .insert(Self::txn_key(txn.id()), encoded)
            .map_err(store_err)?;
        self.db.flush().map_err(store_err)?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Transaction, WorkflowError> {
        match self.db.get(Self::txn_key(id)).map_err(store_err)? {
            Some(bytes) => Self::decode(&bytes),
            None => Err(WorkflowError::NotFound(id.to_string())),
        }
    }

    fn list(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, WorkflowError> {
        self.scan(filter, None)
    }

    fn list_with_cancel(
        &self,
        filter: &TransactionFilter,
        cancel: &CancelToken,
    ) -> Result<Vec<Transaction>, WorkflowError> {
        self.scan(filter, Some(cancel))
    }

    fn list_by_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, WorkflowError> {
        let mut matches = self.scan(&TransactionFilter::default(), None)?;
        matches.retain(|txn| txn.status() == status);
        Ok(matches)
    }

    fn list_by_client(&self, client_id: &str) -> Result<Vec<Transaction>, WorkflowError> {
        let filter = TransactionFilter {
            client_id: Some(client_id.to_string()),
            ..TransactionFilter::default()
        };
        self.scan(&filter, None)
    }

    fn next_sequence(&self) -> Result<u64, WorkflowError> {
        let bumped = self
            .db
            .update_and_fetch(SEQ_KEY, |old| {
                let next = old.map(decode_seq).unwrap_or(0) + 1;
                Some(next.to_be_bytes().to_vec())
            })
            .map_err(store_err)?;

        bumped
            .as_deref()
            .map(decode_seq)
            .ok_or_else(|| store_err("sequence key missing after update"))
    }

    fn register_receipt(&self, receipt: &str, txn_id: &str) -> Result<(), WorkflowError> {
        let swap = self
            .db
            .compare_and_swap(
                Self::receipt_key(receipt),
                None as Option<&[u8]>,
                Some(txn_id.as_bytes()),
            )
            .map_err(store_err)?;
        if swap.is_err() {
            return Err(WorkflowError::ReceiptCollision(receipt.to_string()));
        }
        self.db.flush().map_err(store_err)?;
        Ok(())
    }
}

fn decode_seq(bytes: &[u8]) -> u64 {
    bytes.try_into().map(u64::from_be_bytes).unwrap_or(0)
}

fn store_err(err: impl std::fmt::Display) -> WorkflowError {
    WorkflowError::StoreUnavailable(err.to_string())
}
