//! Error types for the invoice store.
//!
//! Every [`InvoiceDB`](crate::store::InvoiceDB) operation returns an
//! [`InvoiceError`] on failure. None of them are retried internally; a
//! failed write transaction leaves the store exactly as it was.

use sled::transaction::TransactionError;
use thiserror::Error;

use crate::types::PaymentHash;

/// Errors that can occur while storing, reading or settling invoices.
#[derive(Debug, Error)]
pub enum InvoiceError {
    /// The memo or receipt exceeds its size cap. Rejected before any
    /// transaction is opened.
    #[error("invalid invoice: {field} is {len} bytes, max is {max}")]
    InvalidInvoice {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// An invoice paying to this hash already exists.
    #[error("invoice with payment hash {0} already exists")]
    DuplicateInvoice(PaymentHash),

    /// The payment-hash index already holds an entry for this hash.
    #[error("payment hash {0} is already indexed")]
    DuplicatePaymentHash(PaymentHash),

    /// No invoice matches the requested payment hash.
    #[error("unable to locate invoice")]
    InvoiceNotFound,

    /// Enumeration was requested before any invoice was ever added.
    #[error("there are no existing invoices")]
    NoInvoicesCreated,

    /// A stored record or index entry failed to decode.
    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// All 2^32 - 1 invoice IDs have been handed out.
    #[error("invoice identifier space exhausted")]
    IdentifierSpaceExhausted,

    /// The underlying sled engine failed.
    #[error("sled error: {0}")]
    Storage(#[from] sled::Error),
}

impl InvoiceError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        InvoiceError::MalformedRecord {
            reason: reason.into(),
        }
    }
}

impl From<TransactionError<InvoiceError>> for InvoiceError {
    fn from(err: TransactionError<InvoiceError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => InvoiceError::Storage(e),
        }
    }
}

pub type InvoiceResult<T> = Result<T, InvoiceError>;
