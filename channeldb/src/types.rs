//! # Invoice Types
//!
//! The records the store persists. An [`Invoice`] wraps a [`ContractTerm`],
//! whose 32-byte [`PaymentPreimage`] hashes (SHA-256) to the invoice's
//! public identity, the [`PaymentHash`].

use std::fmt;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::config::{MAX_MEMO_SIZE, MAX_RECEIPT_SIZE, PAYMENT_HASH_LENGTH};
use crate::error::{InvoiceError, InvoiceResult};

// ---------------------------------------------------------------------------
// Fixed-size byte strings
// ---------------------------------------------------------------------------

macro_rules! hash_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; PAYMENT_HASH_LENGTH]);

        impl $name {
            pub const fn new(bytes: [u8; PAYMENT_HASH_LENGTH]) -> Self {
                Self(bytes)
            }

            /// Returns `None` unless `bytes` is exactly 32 bytes long.
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                bytes.try_into().ok().map(Self)
            }

            pub fn as_bytes(&self) -> &[u8; PAYMENT_HASH_LENGTH] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl From<[u8; PAYMENT_HASH_LENGTH]> for $name {
            fn from(bytes: [u8; PAYMENT_HASH_LENGTH]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }
    };
}

hash_newtype!(
    /// The secret whose reveal proves a payment may settle the invoice.
    PaymentPreimage
);

hash_newtype!(
    /// SHA-256 of a [`PaymentPreimage`]. The external lookup key.
    PaymentHash
);

impl PaymentPreimage {
    /// Hash the preimage into the payment hash incoming HTLCs will carry.
    pub fn payment_hash(&self) -> PaymentHash {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        let mut digest = [0u8; PAYMENT_HASH_LENGTH];
        digest.copy_from_slice(&hasher.finalize());
        PaymentHash(digest)
    }
}

// ---------------------------------------------------------------------------
// InvoiceId
// ---------------------------------------------------------------------------

/// Primary key of an invoice. Assigned at insertion, starting from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvoiceId(pub u32);

impl InvoiceId {
    /// Big-endian so sled's lexicographic key order is numeric order.
    pub fn to_key(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn from_key(key: &[u8]) -> InvoiceResult<Self> {
        let bytes: [u8; 4] = key.try_into().map_err(|_| {
            InvoiceError::malformed(format!("invoice id must be 4 bytes, got {}", key.len()))
        })?;
        Ok(InvoiceId(u32::from_be_bytes(bytes)))
    }
}

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ContractTerm & Invoice
// ---------------------------------------------------------------------------

/// The conditions that must be met before the invoice counts as paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractTerm {
    /// Revealed by the payer when the HTLC paying to its hash settles.
    pub payment_preimage: PaymentPreimage,

    /// Amount expected, in the smallest currency unit.
    pub value: i64,

    /// Flipped to `true` exactly once, by settlement.
    pub settled: bool,
}

/// A payment request handed out by a payee.
///
/// Invoices are never deleted. Settlement flips `terms.settled`, and that is
/// the only change a stored invoice ever sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    /// Optional free-form description, at most [`MAX_MEMO_SIZE`] bytes.
    pub memo: Vec<u8>,

    /// Optional cryptographically binding receipt, at most
    /// [`MAX_RECEIPT_SIZE`] bytes.
    pub receipt: Vec<u8>,

    pub creation_date: DateTime<Utc>,

    pub terms: ContractTerm,
}

impl Invoice {
    /// New unsettled invoice stamped with the current time.
    pub fn new(payment_preimage: PaymentPreimage, value: i64) -> Self {
        Self {
            memo: Vec::new(),
            receipt: Vec::new(),
            creation_date: Utc::now(),
            terms: ContractTerm {
                payment_preimage,
                value,
                settled: false,
            },
        }
    }

    pub fn with_memo(mut self, memo: impl Into<Vec<u8>>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn with_receipt(mut self, receipt: impl Into<Vec<u8>>) -> Self {
        self.receipt = receipt.into();
        self
    }

    pub fn with_creation_date(mut self, creation_date: DateTime<Utc>) -> Self {
        self.creation_date = creation_date;
        self
    }

    pub fn payment_hash(&self) -> PaymentHash {
        self.terms.payment_preimage.payment_hash()
    }

    pub fn is_settled(&self) -> bool {
        self.terms.settled
    }

    /// Enforce the memo and receipt size caps.
    pub fn validate(&self) -> InvoiceResult<()> {
        if self.memo.len() > MAX_MEMO_SIZE {
            return Err(InvoiceError::InvalidInvoice {
                field: "memo",
                len: self.memo.len(),
                max: MAX_MEMO_SIZE,
            });
        }
        if self.receipt.len() > MAX_RECEIPT_SIZE {
            return Err(InvoiceError::InvalidInvoice {
                field: "receipt",
                len: self.receipt.len(),
                max: MAX_RECEIPT_SIZE,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_hash_is_sha256_of_preimage() {
        // SHA-256 of 32 zero bytes.
        let preimage = PaymentPreimage::new([0u8; 32]);
        assert_eq!(
            preimage.payment_hash().to_hex(),
            "66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925"
        );
    }

    #[test]
    fn distinct_preimages_hash_differently() {
        let a = PaymentPreimage::new([1u8; 32]).payment_hash();
        let b = PaymentPreimage::new([2u8; 32]).payment_hash();
        assert_ne!(a, b);
    }

    #[test]
    fn from_slice_requires_exact_length() {
        assert!(PaymentHash::from_slice(&[0u8; 31]).is_none());
        assert!(PaymentHash::from_slice(&[0u8; 33]).is_none());
        assert_eq!(
            PaymentHash::from_slice(&[7u8; 32]),
            Some(PaymentHash::new([7u8; 32]))
        );
    }

    #[test]
    fn debug_and_display_are_hex() {
        let hash = PaymentHash::new([0x0f; 32]);
        assert_eq!(hash.to_string(), "0f".repeat(32));
        assert_eq!(format!("{hash:?}"), format!("PaymentHash({})", "0f".repeat(32)));
    }

    #[test]
    fn invoice_id_key_is_big_endian() {
        assert_eq!(InvoiceId(1).to_key(), [0, 0, 0, 1]);
        assert_eq!(InvoiceId(0x01020304).to_key(), [1, 2, 3, 4]);
        assert_eq!(InvoiceId::from_key(&[0, 0, 1, 0]).unwrap(), InvoiceId(256));
        assert!(matches!(
            InvoiceId::from_key(&[1, 2, 3]),
            Err(InvoiceError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn new_invoice_starts_unsettled() {
        let invoice = Invoice::new(PaymentPreimage::new([9u8; 32]), 1000).with_memo("coffee");
        assert!(!invoice.is_settled());
        assert_eq!(invoice.memo, b"coffee");
        assert_eq!(invoice.terms.value, 1000);
        assert_eq!(invoice.payment_hash(), invoice.terms.payment_preimage.payment_hash());
    }

    #[test]
    fn validate_accepts_caps_exactly() {
        let invoice = Invoice::new(PaymentPreimage::new([1u8; 32]), 1)
            .with_memo(vec![b'm'; MAX_MEMO_SIZE])
            .with_receipt(vec![b'r'; MAX_RECEIPT_SIZE]);
        assert!(invoice.validate().is_ok());
    }

    #[test]
    fn validate_rejects_oversized_memo() {
        let invoice =
            Invoice::new(PaymentPreimage::new([1u8; 32]), 1).with_memo(vec![0u8; MAX_MEMO_SIZE + 1]);
        match invoice.validate() {
            Err(InvoiceError::InvalidInvoice { field, len, max }) => {
                assert_eq!(field, "memo");
                assert_eq!(len, 1025);
                assert_eq!(max, 1024);
            }
            other => panic!("expected InvalidInvoice, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_oversized_receipt() {
        let invoice = Invoice::new(PaymentPreimage::new([1u8; 32]), 1)
            .with_receipt(vec![0u8; MAX_RECEIPT_SIZE + 1]);
        assert!(matches!(
            invoice.validate(),
            Err(InvoiceError::InvalidInvoice { field: "receipt", .. })
        ));
    }
}
