//! # Invoice Store Configuration & Constants
//!
//! Size caps, on-disk tree names and the runtime knobs for opening an
//! [`InvoiceDB`](crate::store::InvoiceDB). The constants define the on-disk
//! format; changing any of them after invoices have been written means a
//! migration, not a config tweak.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Record Limits
// ---------------------------------------------------------------------------

/// Maximum size of the free-form memo attached to an invoice.
pub const MAX_MEMO_SIZE: usize = 1024;

/// Maximum size of the payment receipt stored alongside an invoice.
pub const MAX_RECEIPT_SIZE: usize = 1024;

/// Upper bound on the serialized creation timestamp. Our encoding uses 13
/// bytes; anything past this cap is garbage, not a newer format.
pub const MAX_TIMESTAMP_SIZE: usize = 300;

/// Payment preimages and payment hashes are both 32 bytes.
pub const PAYMENT_HASH_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Tree Layout
// ---------------------------------------------------------------------------

/// Primary tree: invoice ID (4B BE) -> encoded invoice.
pub const INVOICE_TREE: &str = "invoices";

/// Index tree nested under [`INVOICE_TREE`]: payment hash (32B) -> invoice
/// ID (4B BE), plus the [`NUM_INVOICES_KEY`] counter.
pub const PAYMENT_HASH_INDEX_TREE: &str = "invoices/paymenthashes";

/// Key of the next-invoice-ID counter inside the index tree. Three bytes,
/// so it can never collide with a 32-byte payment hash.
pub const NUM_INVOICES_KEY: &[u8] = b"nik";

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Default sled page cache size: 64 MiB.
pub const DEFAULT_CACHE_CAPACITY_BYTES: u64 = 64 * 1024 * 1024;

/// Options for opening an invoice store.
///
/// Deserializable with every field optional, so a node can embed it as an
/// `[invoices]` section of its own config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceDbConfig {
    /// Directory holding the sled database. Ignored when `temporary` is set.
    pub path: Option<PathBuf>,

    /// Keep everything in a scratch location that is removed on drop.
    pub temporary: bool,

    /// Page cache size handed to sled.
    pub cache_capacity_bytes: u64,

    /// Flush to disk after every committed write transaction.
    pub flush_on_commit: bool,
}

impl Default for InvoiceDbConfig {
    fn default() -> Self {
        Self {
            path: None,
            temporary: false,
            cache_capacity_bytes: DEFAULT_CACHE_CAPACITY_BYTES,
            flush_on_commit: true,
        }
    }
}

impl InvoiceDbConfig {
    /// Persistent store rooted at `path`.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// In-memory scratch store.
    pub fn temporary() -> Self {
        Self {
            temporary: true,
            ..Default::default()
        }
    }

    /// True when the store will not survive being dropped.
    ///
    /// A config with no path at all is treated as temporary rather than
    /// silently writing into the working directory.
    pub fn is_temporary(&self) -> bool {
        self.temporary || self.path.is_none()
    }
}
