//! Service layer API for transaction workflow operations
//!
//! `ApprovalService` is the only code path that mutates a transaction: it
//! validates the role-gated transition table, appends exactly one audit
//! step per applied transition, and re-persists through the injected store.
//! A refused transition leaves the stored record completely untouched.
use crate::audit::AuditAction;
use crate::error::WorkflowError;
use crate::ident;
use crate::stats::StatsSummary;
use crate::store::{CancelToken, TransactionFilter, TransactionStore};
use crate::transaction::{Role, TimeStamp, Transaction, TransactionDraft, TransactionStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Attempts at generating a fresh receipt number before giving up.
const RECEIPT_ATTEMPTS: u32 = 5;

pub struct ApprovalService {
    store: Arc<dyn TransactionStore>,
    // per-id guards so two writers can never interleave on one transaction
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ApprovalService {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the guard for one transaction id. The map lock is held only
    /// long enough to clone the per-id handle, so operations on different
    /// ids never block each other.
    fn id_lock(&self, id: &str) -> Result<Arc<Mutex<()>>, WorkflowError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| WorkflowError::StoreUnavailable(format!("lock table poisoned: {e}")))?;
        Ok(locks.entry(id.to_string()).or_default().clone())
    }

    /// Create a new transaction in `pending` with its `created` audit step.
    pub fn create(&self, draft: TransactionDraft) -> Result<Transaction, WorkflowError> {
        let seq = self.store.next_sequence()?;
        let id = ident::transaction_id(&TimeStamp::new(), seq);
        let txn = draft.build(id)?;
        self.store.insert_new(&txn)?;
        log::debug!(
            "created transaction {}: {} of {} for client {}",
            txn.id(),
            txn.kind(),
            txn.amount(),
            txn.client_id()
        );
        Ok(txn)
    }

    /// Approve per the transition table: admins advance `pending`, managers
    /// advance `pending` or `admin_approved`.
    pub fn approve(
        &self,
        id: &str,
        role: Role,
        actor_id: &str,
        actor_name: &str,
        comment: Option<&str>,
    ) -> Result<Transaction, WorkflowError> {
        let lock = self.id_lock(id)?;
        let _guard = lock
            .lock()
            .map_err(|e| WorkflowError::StoreUnavailable(format!("transaction lock poisoned: {e}")))?;

        let mut txn = self.store.get(id)?;
        let next = match txn.status().approved_by(role) {
            Some(next) => next,
            None => {
                log::warn!("refused approve of {} in status {} by {}", id, txn.status(), role);
                return Err(WorkflowError::InvalidTransition {
                    status: txn.status(),
                    action: "approve",
                    role,
                });
            }
        };

        txn.append_step(
            role,
            actor_id,
            actor_name,
            AuditAction::Approved,
            comment.map(str::to_string),
        );
        txn.apply_transition(next);
        self.store.save(&txn)?;
        log::debug!("transaction {} approved by {}: now {}", id, role, next);
        Ok(txn)
    }

    /// Reject per the transition table. The reason lands on the audit step
    /// and must be non-empty; an auditor will read it later.
    pub fn reject(
        &self,
        id: &str,
        role: Role,
        actor_id: &str,
        actor_name: &str,
        reason: &str,
    ) -> Result<Transaction, WorkflowError> {
        if reason.trim().is_empty() {
            return Err(WorkflowError::MissingReason);
        }

        let lock = self.id_lock(id)?;
        let _guard = lock
            .lock()
            .map_err(|e| WorkflowError::StoreUnavailable(format!("transaction lock poisoned: {e}")))?;

        let mut txn = self.store.get(id)?;
        let next = match txn.status().rejected_by(role) {
            Some(next) => next,
            None => {
                log::warn!("refused reject of {} in status {} by {}", id, txn.status(), role);
                return Err(WorkflowError::InvalidTransition {
                    status: txn.status(),
                    action: "reject",
                    role,
                });
            }
        };

        txn.append_step(
            role,
            actor_id,
            actor_name,
            AuditAction::Rejected,
            Some(reason.to_string()),
        );
        txn.apply_transition(next);
        self.store.save(&txn)?;
        log::debug!("transaction {} rejected by {}: now {}", id, role, next);
        Ok(txn)
    }

    /// Move a manager-approved transaction into `processing`, stamping
    /// `processed_at`.
    pub fn process(
        &self,
        id: &str,
        actor_id: &str,
        actor_name: &str,
    ) -> Result<Transaction, WorkflowError> {
        let lock = self.id_lock(id)?;
        let _guard = lock
            .lock()
            .map_err(|e| WorkflowError::StoreUnavailable(format!("transaction lock poisoned: {e}")))?;

        let mut txn = self.store.get(id)?;
        if txn.status() != TransactionStatus::ManagerApproved {
            log::warn!("refused process of {} in status {}", id, txn.status());
            return Err(WorkflowError::InvalidTransition {
                status: txn.status(),
                action: "process",
                role: Role::Manager,
            });
        }

        txn.append_step(Role::Manager, actor_id, actor_name, AuditAction::Processing, None);
        txn.mark_processed();
        txn.apply_transition(TransactionStatus::Processing);
        self.store.save(&txn)?;
        log::debug!("transaction {} is processing", id);
        Ok(txn)
    }

    /// Complete a processing transaction. The receipt number is taken from
    /// the caller when supplied, otherwise generated; either way the store
    /// enforces that it is bound to exactly one transaction.
    pub fn complete(
        &self,
        id: &str,
        actor_id: &str,
        actor_name: &str,
        receipt: Option<&str>,
    ) -> Result<Transaction, WorkflowError> {
        let lock = self.id_lock(id)?;
        let _guard = lock
            .lock()
            .map_err(|e| WorkflowError::StoreUnavailable(format!("transaction lock poisoned: {e}")))?;

        let mut txn = self.store.get(id)?;
        if txn.status() != TransactionStatus::Processing {
            log::warn!("refused complete of {} in status {}", id, txn.status());
            return Err(WorkflowError::InvalidTransition {
                status: txn.status(),
                action: "complete",
                role: Role::Manager,
            });
        }

        let number = match receipt {
            Some(number) => {
                self.store.register_receipt(number, id)?;
                number.to_string()
            }
            None => self.reserve_receipt(id)?,
        };

        txn.append_step(Role::Manager, actor_id, actor_name, AuditAction::Completed, None);
        txn.assign_receipt(number);
        txn.apply_transition(TransactionStatus::Completed);
        self.store.save(&txn)?;
        log::debug!(
            "transaction {} completed under receipt {}",
            id,
            txn.receipt_number().unwrap_or("?")
        );
        Ok(txn)
    }

    /// Fail a transaction from any non-terminal state. Like rejection this
    /// needs an audit-visible reason.
    pub fn fail(
        &self,
        id: &str,
        actor_id: &str,
        actor_name: &str,
        reason: &str,
    ) -> Result<Transaction, WorkflowError> {
        if reason.trim().is_empty() {
            return Err(WorkflowError::MissingReason);
        }

        let lock = self.id_lock(id)?;
        let _guard = lock
            .lock()
            .map_err(|e| WorkflowError::StoreUnavailable(format!("transaction lock poisoned: {e}")))?;

        let mut txn = self.store.get(id)?;
        if txn.status().is_terminal() {
            log::warn!("refused fail of {} in terminal status {}", id, txn.status());
            return Err(WorkflowError::InvalidTransition {
                status: txn.status(),
                action: "fail",
                role: Role::Manager,
            });
        }

        txn.append_step(
            Role::Manager,
            actor_id,
            actor_name,
            AuditAction::Failed,
            Some(reason.to_string()),
        );
        txn.apply_transition(TransactionStatus::Failed);
        self.store.save(&txn)?;
        log::debug!("transaction {} failed: {}", id, reason);
        Ok(txn)
    }

    pub fn get(&self, id: &str) -> Result<Transaction, WorkflowError> {
        self.store.get(id)
    }

    pub fn list(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, WorkflowError> {
        self.store.list(filter)
    }

    pub fn list_by_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, WorkflowError> {
        self.store.list_by_status(status)
    }

    pub fn list_by_client(&self, client_id: &str) -> Result<Vec<Transaction>, WorkflowError> {
        self.store.list_by_client(client_id)
    }

    /// Aggregate counts and volumes over the matching transactions,
    /// recomputed from the store on every call.
    pub fn stats(&self, filter: &TransactionFilter) -> Result<StatsSummary, WorkflowError> {
        Ok(StatsSummary::compute(&self.store.list(filter)?))
    }

    /// Same as [`stats`](Self::stats) but abandonable mid-scan; large date
    /// ranges can take a while on a big store.
    pub fn stats_cancellable(
        &self,
        filter: &TransactionFilter,
        cancel: &CancelToken,
    ) -> Result<StatsSummary, WorkflowError> {
        Ok(StatsSummary::compute(
            &self.store.list_with_cancel(filter, cancel)?,
        ))
    }

    fn reserve_receipt(&self, id: &str) -> Result<String, WorkflowError> {
        let mut number = ident::receipt_number(&TimeStamp::new());
        for _ in 0..RECEIPT_ATTEMPTS {
            match self.store.register_receipt(&number, id) {
                Ok(()) => return Ok(number),
                Err(WorkflowError::ReceiptCollision(_)) => {
                    number = ident::receipt_number(&TimeStamp::new());
                }
                Err(other) => return Err(other),
            }
        }
        Err(WorkflowError::ReceiptCollision(number))
    }
}
