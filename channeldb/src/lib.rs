// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NOVA ChannelDB — Invoice Persistence
//!
//! Durable storage for the invoices a NOVA payment-channel node hands out.
//! A merchant creates an invoice against a secret preimage, we persist it,
//! and later an incoming payment carrying the preimage's SHA-256 hash is
//! used to find the invoice and settle it.
//!
//! ## Architecture
//!
//! - **codec** — Byte-exact binary layout of an invoice record.
//! - **index** — Payment-hash index and the auto-incrementing invoice ID.
//! - **store** — `InvoiceDB`: add, lookup, fetch-all and settle on top of sled.
//! - **types** — Invoices, contract terms, preimages and payment hashes.
//! - **config** — Size caps, tree names and the store configuration.
//! - **error** — The one error type every operation returns.
//! - **logging** — `tracing` subscriber setup for embedding services.
//!
//! ## Ground Rules
//!
//! 1. Every payment hash maps to exactly one invoice. Duplicates are
//!    rejected inside the write transaction.
//! 2. Invoice IDs start at 0, grow by one per insertion and are never reused.
//! 3. Invoices are never deleted. The only mutation is settling, and a
//!    settled invoice stays settled.

pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod store;
pub mod types;

pub use config::InvoiceDbConfig;
pub use error::{InvoiceError, InvoiceResult};
pub use store::InvoiceDB;
pub use types::{ContractTerm, Invoice, InvoiceId, PaymentHash, PaymentPreimage};
