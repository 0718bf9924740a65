//! Core transaction record, workflow enums and the creation draft
use super::audit::{AuditAction, AuditStep};
use super::error::WorkflowError;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransactionType {
    #[n(0)]
    Deposit,
    #[n(1)]
    Withdrawal,
    #[n(2)]
    Transfer,
    #[n(3)]
    Adjustment,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum PaymentMethod {
    #[n(0)]
    Cash,
    #[n(1)]
    BankTransfer,
    #[n(2)]
    CreditCard,
    #[n(3)]
    DebitCard,
    #[n(4)]
    EWallet,
    #[n(5)]
    Check,
    #[n(6)]
    WireTransfer,
    #[n(7)]
    Cryptocurrency,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum Role {
    #[n(0)]
    Client,
    #[n(1)]
    Admin,
    #[n(2)]
    Manager,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TransactionStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    AdminApproved,
    #[n(2)]
    AdminRejected,
    #[n(3)]
    ManagerApproved,
    #[n(4)]
    ManagerRejected,
    #[n(5)]
    Processing,
    #[n(6)]
    Completed,
    #[n(7)]
    Failed,
}

impl TransactionStatus {
    /// A terminal status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::AdminRejected
                | TransactionStatus::ManagerRejected
                | TransactionStatus::Completed
                | TransactionStatus::Failed
        )
    }

    /// Target status when `role` approves from this status, if the
    /// transition table admits it. A manager may approve straight from
    /// `pending`, skipping the admin step; admins only act on `pending`.
    pub fn approved_by(&self, role: Role) -> Option<TransactionStatus> {
        match (self, role) {
            (TransactionStatus::Pending, Role::Admin) => Some(TransactionStatus::AdminApproved),
            (TransactionStatus::Pending, Role::Manager) => Some(TransactionStatus::ManagerApproved),
            (TransactionStatus::AdminApproved, Role::Manager) => {
                Some(TransactionStatus::ManagerApproved)
            }
            _ => None,
        }
    }

    /// Target status when `role` rejects from this status. Mirrors the
    /// approval cells of the table.
    pub fn rejected_by(&self, role: Role) -> Option<TransactionStatus> {
        match (self, role) {
            (TransactionStatus::Pending, Role::Admin) => Some(TransactionStatus::AdminRejected),
            (TransactionStatus::Pending, Role::Manager) => Some(TransactionStatus::ManagerRejected),
            (TransactionStatus::AdminApproved, Role::Manager) => {
                Some(TransactionStatus::ManagerRejected)
            }
            _ => None,
        }
    }

    /// The action whose audit step lands a transaction in this status.
    pub fn recording_action(&self) -> AuditAction {
        match self {
            TransactionStatus::Pending => AuditAction::Created,
            TransactionStatus::AdminApproved | TransactionStatus::ManagerApproved => {
                AuditAction::Approved
            }
            TransactionStatus::AdminRejected | TransactionStatus::ManagerRejected => {
                AuditAction::Rejected
            }
            TransactionStatus::Processing => AuditAction::Processing,
            TransactionStatus::Completed => AuditAction::Completed,
            TransactionStatus::Failed => AuditAction::Failed,
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// One deposit or withdrawal request moving through the approval workflow.
///
/// Every field is private. Reads go through the getters; `status`,
/// `approval_chain` and the completion fields change only through the
/// `pub(crate)` methods the service layer drives, so the transition table
/// is the single mutation path.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct Transaction {
    #[n(0)]
    id: String,
    #[n(1)]
    kind: TransactionType,
    #[n(2)]
    amount: u64, // minor currency units
    #[n(3)]
    client_id: String,
    #[n(4)]
    client_name: String,
    #[n(5)]
    client_account: String,
    #[n(6)]
    payment_method: PaymentMethod,
    #[n(7)]
    comment: Option<String>,
    #[n(8)]
    initiated_by: String,
    #[n(9)]
    initiator_role: Role,
    #[n(10)]
    initiator_name: String,
    #[n(11)]
    branch: String,
    #[n(12)]
    status: TransactionStatus,
    #[n(13)]
    created_at: TimeStamp<Utc>,
    #[n(14)]
    updated_at: TimeStamp<Utc>,
    #[n(15)]
    processed_at: Option<TimeStamp<Utc>>,
    #[n(16)]
    completed_at: Option<TimeStamp<Utc>>,
    #[n(17)]
    receipt_number: Option<String>,
    #[n(18)]
    approval_chain: Vec<AuditStep>,
}

impl Transaction {
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn kind(&self) -> TransactionType {
        self.kind
    }
    pub fn amount(&self) -> u64 {
        self.amount
    }
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
    pub fn client_name(&self) -> &str {
        &self.client_name
    }
    pub fn client_account(&self) -> &str {
        &self.client_account
    }
    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
    pub fn initiated_by(&self) -> &str {
        &self.initiated_by
    }
    pub fn initiator_role(&self) -> Role {
        self.initiator_role
    }
    pub fn initiator_name(&self) -> &str {
        &self.initiator_name
    }
    pub fn branch(&self) -> &str {
        &self.branch
    }
    pub fn status(&self) -> TransactionStatus {
        self.status
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
    pub fn updated_at(&self) -> &TimeStamp<Utc> {
        &self.updated_at
    }
    pub fn processed_at(&self) -> Option<&TimeStamp<Utc>> {
        self.processed_at.as_ref()
    }
    pub fn completed_at(&self) -> Option<&TimeStamp<Utc>> {
        self.completed_at.as_ref()
    }
    pub fn receipt_number(&self) -> Option<&str> {
        self.receipt_number.as_deref()
    }
    pub fn approval_chain(&self) -> &[AuditStep] {
        &self.approval_chain
    }
    pub fn last_step(&self) -> Option<&AuditStep> {
        self.approval_chain.last()
    }

    /// Append one audit step, stamped now. Returns the appended step so
    /// callers can surface it without re-reading the transaction.
    pub(crate) fn append_step(
        &mut self,
        role: Role,
        user_id: &str,
        user_name: &str,
        action: AuditAction,
        comment: Option<String>,
    ) -> AuditStep {
        let step = AuditStep::record(role, user_id, user_name, action, comment);
        self.approval_chain.push(step.clone());
        step
    }

    pub(crate) fn apply_transition(&mut self, to: TransactionStatus) {
        self.status = to;
        self.updated_at = TimeStamp::new();
    }

    pub(crate) fn mark_processed(&mut self) {
        self.processed_at = Some(TimeStamp::new());
    }

    pub(crate) fn assign_receipt(&mut self, number: String) {
        self.receipt_number = Some(number);
        self.completed_at = Some(TimeStamp::new());
    }
}

/// Draft of a creation request, assembled field by field before being
/// handed to the service. Validation happens on build, one check per
/// required field.
#[derive(Debug, Default, Clone)]
pub struct TransactionDraft {
    kind: Option<TransactionType>,
    amount: u64,
    client_id: Option<String>,
    client_name: Option<String>,
    client_account: Option<String>,
    payment_method: Option<PaymentMethod>,
    comment: Option<String>,
    initiated_by: Option<String>,
    initiator_role: Option<Role>,
    initiator_name: Option<String>,
    branch: Option<String>,
}

impl TransactionDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_kind(mut self, kind: TransactionType) -> Self {
        self.kind = Some(kind);
        self
    }
    pub fn set_amount(mut self, minor_units: u64) -> Self {
        self.amount = minor_units;
        self
    }
    pub fn set_client_id(mut self, id: &str) -> Self {
        self.client_id = Some(id.to_string());
        self
    }
    pub fn set_client_name(mut self, name: &str) -> Self {
        self.client_name = Some(name.to_string());
        self
    }
    pub fn set_client_account(mut self, account: &str) -> Self {
        self.client_account = Some(account.to_string());
        self
    }
    pub fn set_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }
    pub fn set_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }
    pub fn set_initiated_by(mut self, user_id: &str) -> Self {
        self.initiated_by = Some(user_id.to_string());
        self
    }
    pub fn set_initiator_role(mut self, role: Role) -> Self {
        self.initiator_role = Some(role);
        self
    }
    pub fn set_initiator_name(mut self, name: &str) -> Self {
        self.initiator_name = Some(name.to_string());
        self
    }
    pub fn set_branch(mut self, branch: &str) -> Self {
        self.branch = Some(branch.to_string());
        self
    }

    /// Run the field checks without creating anything. Useful for form
    /// surfaces that want to reject bad input before calling the service.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        self.clone().build(String::from("draft")).map(|_| ())
    }

    /// Checks fields, then assembles the pending transaction with its
    /// `created` audit step. The id comes from the caller; the service owns
    /// id assignment.
    pub(crate) fn build(self, id: String) -> Result<Transaction, WorkflowError> {
        if self.amount == 0 {
            return Err(WorkflowError::InvalidAmount);
        }
        let kind = self.kind.ok_or(WorkflowError::MissingField("type"))?;
        let payment_method = self
            .payment_method
            .ok_or(WorkflowError::MissingField("payment_method"))?;
        let initiator_role = self
            .initiator_role
            .ok_or(WorkflowError::MissingField("initiator_role"))?;
        let client_id = required(self.client_id, "client_id")?;
        let client_name = required(self.client_name, "client_name")?;
        let client_account = required(self.client_account, "client_account")?;
        let initiated_by = required(self.initiated_by, "initiated_by")?;
        let initiator_name = required(self.initiator_name, "initiator_name")?;
        let branch = required(self.branch, "branch")?;

        let now = TimeStamp::new();
        let mut txn = Transaction {
            id,
            kind,
            amount: self.amount,
            client_id,
            client_name,
            client_account,
            payment_method,
            comment: self.comment.clone(),
            initiated_by,
            initiator_role,
            initiator_name,
            branch,
            status: TransactionStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
            processed_at: None,
            completed_at: None,
            receipt_number: None,
            approval_chain: Vec::new(),
        };
        let (user_id, user_name) = (txn.initiated_by.clone(), txn.initiator_name.clone());
        txn.append_step(
            initiator_role,
            &user_id,
            &user_name,
            AuditAction::Created,
            self.comment,
        );

        Ok(txn)
    }
}

fn required(field: Option<String>, name: &'static str) -> Result<String, WorkflowError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(WorkflowError::MissingField(name)),
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Deposit => write!(f, "deposit"),
            TransactionType::Withdrawal => write!(f, "withdrawal"),
            TransactionType::Transfer => write!(f, "transfer"),
            TransactionType::Adjustment => write!(f, "adjustment"),
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            "transfer" => Ok(TransactionType::Transfer),
            "adjustment" => Ok(TransactionType::Adjustment),
            _ => Err(format!("Invalid transaction type: {}", s)),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::BankTransfer => write!(f, "bank_transfer"),
            PaymentMethod::CreditCard => write!(f, "credit_card"),
            PaymentMethod::DebitCard => write!(f, "debit_card"),
            PaymentMethod::EWallet => write!(f, "e_wallet"),
            PaymentMethod::Check => write!(f, "check"),
            PaymentMethod::WireTransfer => write!(f, "wire_transfer"),
            PaymentMethod::Cryptocurrency => write!(f, "cryptocurrency"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "debit_card" => Ok(PaymentMethod::DebitCard),
            "e_wallet" => Ok(PaymentMethod::EWallet),
            "check" => Ok(PaymentMethod::Check),
            "wire_transfer" => Ok(PaymentMethod::WireTransfer),
            "cryptocurrency" => Ok(PaymentMethod::Cryptocurrency),
            _ => Err(format!("Invalid payment method: {}", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Admin => write!(f, "admin"),
            Role::Manager => write!(f, "manager"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::AdminApproved => write!(f, "admin_approved"),
            TransactionStatus::AdminRejected => write!(f, "admin_rejected"),
            TransactionStatus::ManagerApproved => write!(f, "manager_approved"),
            TransactionStatus::ManagerRejected => write!(f, "manager_rejected"),
            TransactionStatus::Processing => write!(f, "processing"),
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "admin_approved" => Ok(TransactionStatus::AdminApproved),
            "admin_rejected" => Ok(TransactionStatus::AdminRejected),
            "manager_approved" => Ok(TransactionStatus::ManagerApproved),
            "manager_rejected" => Ok(TransactionStatus::ManagerRejected),
            "processing" => Ok(TransactionStatus::Processing),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_draft() -> TransactionDraft {
        TransactionDraft::new()
            .set_kind(TransactionType::Deposit)
            .set_amount(500_000)
            .set_client_id("C-1001")
            .set_client_name("Dana Flores")
            .set_client_account("ACC-2201")
            .set_payment_method(PaymentMethod::BankTransfer)
            .set_initiated_by("U-100")
            .set_initiator_role(Role::Admin)
            .set_initiator_name("Avery Ortiz")
            .set_branch("BR-01")
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn transaction_encoding() {
        let original = full_draft()
            .set_comment("walk-in deposit")
            .build("TXN-2026-000001".into())
            .unwrap();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: Transaction = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn build_opens_the_chain_with_created() {
        let txn = full_draft().build("TXN-2026-000001".into()).unwrap();

        assert_eq!(txn.status(), TransactionStatus::Pending);
        assert_eq!(txn.approval_chain().len(), 1);
        assert_eq!(txn.approval_chain()[0].action(), AuditAction::Created);
        assert_eq!(txn.approval_chain()[0].role(), Role::Admin);
        assert!(txn.receipt_number().is_none());
        assert!(txn.completed_at().is_none());
        assert!(txn.processed_at().is_none());
    }

    #[test]
    fn status_strings_roundtrip() {
        let statuses = [
            TransactionStatus::Pending,
            TransactionStatus::AdminApproved,
            TransactionStatus::AdminRejected,
            TransactionStatus::ManagerApproved,
            TransactionStatus::ManagerRejected,
            TransactionStatus::Processing,
            TransactionStatus::Completed,
            TransactionStatus::Failed,
        ];

        for status in statuses {
            let parsed: TransactionStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
