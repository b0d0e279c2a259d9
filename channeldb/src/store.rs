//! # InvoiceDB — Invoice Persistence on sled
//!
//! ## Tree Layout
//!
//! | Tree                     | Key                  | Value               |
//! |--------------------------|----------------------|---------------------|
//! | `invoices`               | invoice ID (4B BE)   | encoded [`Invoice`] |
//! | `invoices/paymenthashes` | `nik`                | next ID (4B BE)     |
//! | `invoices/paymenthashes` | payment hash (32B)   | invoice ID (4B BE)  |
//!
//! Invoice IDs are big-endian so sled's lexicographic order is numeric
//! order.
//!
//! ## Atomicity
//!
//! Every operation runs inside one sled transaction spanning both trees.
//! Adding an invoice bumps the counter, writes the hash entry and writes
//! the record in that single transaction; a duplicate hash aborts it and
//! nothing lands on disk. Readers go through a read-only transaction too,
//! so they never see an indexed hash without its record.
//!
//! ## Tree Creation
//!
//! Only [`InvoiceDB::add_invoice`] creates the trees. Reads on a fresh
//! store report "not found" / "no invoices" instead of quietly creating
//! empty trees, which keeps [`InvoiceError::NoInvoicesCreated`] meaningful.

use std::path::Path;

use sled::{Db, IVec, Transactional, Tree};
use tracing::{debug, info, warn};

use crate::codec::{decode_invoice, encode_invoice};
use crate::config::{InvoiceDbConfig, INVOICE_TREE, PAYMENT_HASH_INDEX_TREE};
use crate::error::{InvoiceError, InvoiceResult};
use crate::index::{abort, PaymentHashIndex, TxResult};
use crate::types::{Invoice, InvoiceId, PaymentHash};

/// Durable invoice store.
///
/// Cheap to clone; clones share the same sled instance. sled serializes
/// conflicting write transactions and lets readers run concurrently, so an
/// `InvoiceDB` can be shared across threads without extra locking.
#[derive(Debug, Clone)]
pub struct InvoiceDB {
    db: Db,
    flush_on_commit: bool,
}

impl InvoiceDB {
    /// Open or create a persistent store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> InvoiceResult<Self> {
        Self::open_with_config(&InvoiceDbConfig::at_path(path.as_ref()))
    }

    /// Scratch store that disappears when the last handle is dropped.
    pub fn open_temporary() -> InvoiceResult<Self> {
        Self::open_with_config(&InvoiceDbConfig::temporary())
    }

    /// Open a store as described by `config`. A config without a path, or
    /// with `temporary` set, gives a scratch store.
    pub fn open_with_config(config: &InvoiceDbConfig) -> InvoiceResult<Self> {
        let mut sled_config = sled::Config::new().cache_capacity(config.cache_capacity_bytes);
        match &config.path {
            Some(path) if !config.is_temporary() => sled_config = sled_config.path(path),
            _ => sled_config = sled_config.temporary(true),
        }

        let db = sled_config.open()?;
        info!(
            path = ?config.path,
            temporary = config.is_temporary(),
            "invoice store opened"
        );

        Ok(Self {
            db,
            flush_on_commit: config.flush_on_commit,
        })
    }

    // -- Write operations ---------------------------------------------------

    /// Insert a new invoice and return the ID it was assigned.
    ///
    /// Fails with [`InvoiceError::InvalidInvoice`] before touching the
    /// database if the memo or receipt is oversized, and with
    /// [`InvoiceError::DuplicateInvoice`] if an invoice paying to the same
    /// hash already exists.
    ///
    /// Once the transaction commits the invoice is stored and `Ok` is
    /// returned, even if the follow-up flush fails; that failure is logged.
    pub fn add_invoice(&self, invoice: &Invoice) -> InvoiceResult<InvoiceId> {
        invoice.validate()?;

        let (invoices, index) = self.create_trees()?;
        let payment_hash = invoice.payment_hash();
        let record = encode_invoice(invoice);

        let id = (&invoices, &index).transaction(|(records, hashes)| -> TxResult<InvoiceId> {
            let index = PaymentHashIndex::new(hashes);
            if index.try_resolve(&payment_hash)?.is_some() {
                return abort(InvoiceError::DuplicateInvoice(payment_hash));
            }

            let id = index.next_identifier()?;
            index.reserve(&payment_hash, id)?;
            index.advance_counter(id)?;
            records.insert(&id.to_key()[..], &record[..])?;

            Ok(id)
        })?;

        self.after_commit("add");
        debug!(invoice_id = %id, payment_hash = %payment_hash, "invoice added");

        Ok(id)
    }

    /// Mark the invoice paying to `payment_hash` as settled and return it.
    ///
    /// Settling an already-settled invoice succeeds and changes nothing.
    /// The ID and hash mapping are never touched. A corrupt record is
    /// reported as [`InvoiceError::MalformedRecord`] and left as it is.
    pub fn settle_invoice(&self, payment_hash: &PaymentHash) -> InvoiceResult<Invoice> {
        let Some((invoices, index)) = self.existing_trees()? else {
            debug!(payment_hash = %payment_hash, "settle on empty store");
            return Err(InvoiceError::InvoiceNotFound);
        };

        let (id, invoice) = (&invoices, &index).transaction(
            |(records, hashes)| -> TxResult<(InvoiceId, Invoice)> {
                let id = PaymentHashIndex::new(hashes).resolve(payment_hash)?;
                let Some(record) = records.get(id.to_key())? else {
                    return abort(InvoiceError::InvoiceNotFound);
                };

                let mut invoice = match decode_record(id, &record) {
                    Ok(invoice) => invoice,
                    Err(e) => return abort(e),
                };
                invoice.terms.settled = true;
                records.insert(&id.to_key()[..], encode_invoice(&invoice))?;

                Ok((id, invoice))
            },
        )?;

        self.after_commit("settle");
        debug!(invoice_id = %id, payment_hash = %payment_hash, "invoice settled");

        Ok(invoice)
    }

    // -- Read operations ----------------------------------------------------

    /// Find the invoice paying to `payment_hash`.
    ///
    /// Callers should check the returned terms (value, settled flag) before
    /// accepting an incoming payment against it.
    pub fn lookup_invoice(&self, payment_hash: &PaymentHash) -> InvoiceResult<Invoice> {
        let Some((invoices, index)) = self.existing_trees()? else {
            debug!(payment_hash = %payment_hash, "lookup on empty store");
            return Err(InvoiceError::InvoiceNotFound);
        };

        let (id, record) = (&invoices, &index).transaction(
            |(records, hashes)| -> TxResult<(InvoiceId, IVec)> {
                let id = PaymentHashIndex::new(hashes).resolve(payment_hash)?;
                match records.get(id.to_key())? {
                    Some(record) => Ok((id, record)),
                    None => abort(InvoiceError::InvoiceNotFound),
                }
            },
        )?;

        decode_record(id, &record)
    }

    /// Every stored invoice in ascending ID order. With `pending_only`,
    /// settled invoices are skipped.
    ///
    /// Fails with [`InvoiceError::NoInvoicesCreated`] if no invoice was ever
    /// added. A single corrupt record fails the whole call.
    pub fn fetch_all_invoices(&self, pending_only: bool) -> InvoiceResult<Vec<Invoice>> {
        let Some((invoices, index)) = self.existing_trees()? else {
            if self.tree_exists(INVOICE_TREE) {
                // No index means no counter, so nothing was ever committed.
                return Ok(Vec::new());
            }
            return Err(InvoiceError::NoInvoicesCreated);
        };

        // Walk 0..counter inside one transaction so the result is a
        // consistent snapshot even while writers are active.
        let records = (&invoices, &index).transaction(
            |(records, hashes)| -> TxResult<Vec<(InvoiceId, IVec)>> {
                let end = PaymentHashIndex::new(hashes).next_identifier()?;
                let mut out = Vec::new();
                for raw in 0..end.0 {
                    let id = InvoiceId(raw);
                    match records.get(id.to_key())? {
                        Some(record) if !record.is_empty() => out.push((id, record)),
                        _ => {}
                    }
                }
                Ok(out)
            },
        )?;

        let mut result = Vec::with_capacity(records.len());
        for (id, record) in records {
            let invoice = decode_record(id, &record)?;
            if pending_only && invoice.terms.settled {
                continue;
            }
            result.push(invoice);
        }

        Ok(result)
    }

    /// The ID the next invoice will get, which is also the number of
    /// invoices ever added. 0 on a fresh store.
    pub fn num_invoices(&self) -> InvoiceResult<u32> {
        let Some((invoices, index)) = self.existing_trees()? else {
            return Ok(0);
        };
        let next = (&invoices, &index).transaction(|(_, hashes)| -> TxResult<InvoiceId> {
            PaymentHashIndex::new(hashes).next_identifier()
        })?;
        Ok(next.0)
    }

    // -- Utility operations -------------------------------------------------

    /// Block until every pending write is durable.
    pub fn flush(&self) -> InvoiceResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Flush after a committed write when `flush_on_commit` is set. The
    /// write already happened, so a flush error is logged, not returned.
    fn after_commit(&self, op: &'static str) {
        if self.flush_on_commit {
            report_flush(op, self.db.flush());
        }
    }

    fn tree_exists(&self, name: &str) -> bool {
        self.db
            .tree_names()
            .iter()
            .any(|existing| &existing[..] == name.as_bytes())
    }

    /// Both invoice trees, or `None` if either was never created.
    fn existing_trees(&self) -> InvoiceResult<Option<(Tree, Tree)>> {
        if !self.tree_exists(INVOICE_TREE) || !self.tree_exists(PAYMENT_HASH_INDEX_TREE) {
            return Ok(None);
        }
        self.create_trees().map(Some)
    }

    fn create_trees(&self) -> InvoiceResult<(Tree, Tree)> {
        // Index first: a half-finished creation then still reads as a
        // fresh store.
        let index = self.db.open_tree(PAYMENT_HASH_INDEX_TREE)?;
        let invoices = self.db.open_tree(INVOICE_TREE)?;
        Ok((invoices, index))
    }
}

/// Log a failed post-commit flush. Returns whether the flush succeeded.
fn report_flush(op: &'static str, result: sled::Result<usize>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            warn!(op, error = %e, "flush after commit failed; write is committed but may not be durable");
            false
        }
    }
}

fn decode_record(id: InvoiceId, record: &[u8]) -> InvoiceResult<Invoice> {
    decode_invoice(record).map_err(|e| {
        warn!(invoice_id = %id, error = %e, "corrupt invoice record");
        e
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
