//! Read-only aggregates over the transaction store
use crate::transaction::{Transaction, TransactionStatus, TransactionType};

/// Number of transactions currently in each status.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct StatusCounts {
    pub pending: u64,
    pub admin_approved: u64,
    pub admin_rejected: u64,
    pub manager_approved: u64,
    pub manager_rejected: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl StatusCounts {
    fn bump(&mut self, status: TransactionStatus) {
        match status {
            TransactionStatus::Pending => self.pending += 1,
            TransactionStatus::AdminApproved => self.admin_approved += 1,
            TransactionStatus::AdminRejected => self.admin_rejected += 1,
            TransactionStatus::ManagerApproved => self.manager_approved += 1,
            TransactionStatus::ManagerRejected => self.manager_rejected += 1,
            TransactionStatus::Processing => self.processing += 1,
            TransactionStatus::Completed => self.completed += 1,
            TransactionStatus::Failed => self.failed += 1,
        }
    }

    pub fn of(&self, status: TransactionStatus) -> u64 {
        match status {
            TransactionStatus::Pending => self.pending,
            TransactionStatus::AdminApproved => self.admin_approved,
            TransactionStatus::AdminRejected => self.admin_rejected,
            TransactionStatus::ManagerApproved => self.manager_approved,
            TransactionStatus::ManagerRejected => self.manager_rejected,
            TransactionStatus::Processing => self.processing,
            TransactionStatus::Completed => self.completed,
            TransactionStatus::Failed => self.failed,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending
            + self.admin_approved
            + self.admin_rejected
            + self.manager_approved
            + self.manager_rejected
            + self.processing
            + self.completed
            + self.failed
    }
}

/// Dashboard summary over a set of transactions. Rejected and failed
/// transactions never contribute to any volume sum.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct StatsSummary {
    pub counts: StatusCounts,
    /// Sum of completed deposit amounts, minor units.
    pub completed_deposit_volume: u64,
    /// Sum of completed withdrawal amounts, minor units.
    pub completed_withdrawal_volume: u64,
    /// Sum of amounts still in flight: every non-terminal status.
    pub pending_exposure: u64,
}

impl StatsSummary {
    pub fn compute(transactions: &[Transaction]) -> Self {
        let mut summary = StatsSummary::default();
        for txn in transactions {
            summary.counts.bump(txn.status());
            match txn.status() {
                TransactionStatus::Completed => match txn.kind() {
                    TransactionType::Deposit => summary.completed_deposit_volume += txn.amount(),
                    TransactionType::Withdrawal => {
                        summary.completed_withdrawal_volume += txn.amount()
                    }
                    _ => {}
                },
                status if !status.is_terminal() => summary.pending_exposure += txn.amount(),
                _ => {}
            }
        }
        summary
    }
}
