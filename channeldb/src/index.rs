//! # Payment-Hash Index
//!
//! Secondary index living in the `invoices/paymenthashes` tree:
//!
//! | Key               | Value                        |
//! |-------------------|------------------------------|
//! | `nik`             | next invoice ID (4B BE)      |
//! | payment hash (32B)| invoice ID (4B BE)           |
//!
//! A [`PaymentHashIndex`] only ever wraps a tree *inside* a sled
//! transaction, so the counter bump, the hash entry and the primary record
//! written by the store all commit or vanish together. There is no
//! in-memory copy of the counter to drift away from what's on disk.

use sled::transaction::{ConflictableTransactionError, TransactionalTree};

use crate::config::NUM_INVOICES_KEY;
use crate::error::InvoiceError;
use crate::types::{InvoiceId, PaymentHash};

/// Result type for code running inside a sled transaction closure.
pub type TxResult<T> = Result<T, ConflictableTransactionError<InvoiceError>>;

/// Abort the surrounding transaction with a domain error.
pub(crate) fn abort<T>(err: InvoiceError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

/// Transactional view of the payment-hash index.
pub struct PaymentHashIndex<'a> {
    tree: &'a TransactionalTree,
}

impl<'a> PaymentHashIndex<'a> {
    pub fn new(tree: &'a TransactionalTree) -> Self {
        Self { tree }
    }

    /// The ID the next inserted invoice will receive. A missing counter
    /// reads as 0; nothing is written.
    pub fn next_identifier(&self) -> TxResult<InvoiceId> {
        match self.tree.get(NUM_INVOICES_KEY)? {
            Some(bytes) => match InvoiceId::from_key(&bytes) {
                Ok(id) => Ok(id),
                Err(e) => abort(e),
            },
            None => Ok(InvoiceId(0)),
        }
    }

    /// Map `hash` to `id`. Refuses to overwrite an existing entry.
    pub fn reserve(&self, hash: &PaymentHash, id: InvoiceId) -> TxResult<()> {
        if self.tree.get(hash.as_bytes())?.is_some() {
            return abort(InvoiceError::DuplicatePaymentHash(*hash));
        }
        self.tree.insert(&hash.as_bytes()[..], &id.to_key()[..])?;
        Ok(())
    }

    /// Persist `id + 1` as the next identifier.
    pub fn advance_counter(&self, id: InvoiceId) -> TxResult<()> {
        let Some(next) = id.0.checked_add(1) else {
            return abort(InvoiceError::IdentifierSpaceExhausted);
        };
        self.tree.insert(NUM_INVOICES_KEY, &InvoiceId(next).to_key()[..])?;
        Ok(())
    }

    /// Look up the invoice ID for `hash`, if one was ever reserved.
    pub fn try_resolve(&self, hash: &PaymentHash) -> TxResult<Option<InvoiceId>> {
        match self.tree.get(hash.as_bytes())? {
            Some(bytes) => match InvoiceId::from_key(&bytes) {
                Ok(id) => Ok(Some(id)),
                Err(e) => abort(e),
            },
            None => Ok(None),
        }
    }

    /// Like [`try_resolve`](Self::try_resolve), but a miss aborts with
    /// [`InvoiceError::InvoiceNotFound`].
    pub fn resolve(&self, hash: &PaymentHash) -> TxResult<InvoiceId> {
        match self.try_resolve(hash)? {
            Some(id) => Ok(id),
            None => abort(InvoiceError::InvoiceNotFound),
        }
    }
}
