//! Identifier and receipt-number construction
use crate::transaction::TimeStamp;
use chrono::{Datelike, Utc};
use uuid7::uuid7;

/// Zero-padded width of the store sequence inside a transaction id.
const SEQ_WIDTH: usize = 6;

/// Human-readable transaction id embedding the creation year and the
/// store-owned sequence number, e.g. `TXN-2026-000042`. Uniqueness comes
/// from the sequence; the year makes ids greppable by creation period.
pub fn transaction_id(created_at: &TimeStamp<Utc>, seq: u64) -> String {
    let year = created_at.to_datetime_utc().year();
    format!("TXN-{}-{:0width$}", year, seq, width = SEQ_WIDTH)
}

/// Receipt number embedding the completion year and month plus a random
/// suffix, e.g. `RCP-202608-1fa3c97b`. The suffix is the random tail of a
/// fresh uuid7; the store still enforces uniqueness on registration.
pub fn receipt_number(completed_at: &TimeStamp<Utc>) -> String {
    let date = completed_at.to_datetime_utc();
    let suffix = hex::encode(&uuid7().as_bytes()[12..]);
    format!("RCP-{}{:02}-{}", date.year(), date.month(), suffix)
}
