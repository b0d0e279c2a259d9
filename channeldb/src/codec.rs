//! # Invoice Record Codec
//!
//! Byte-exact serialization of an [`Invoice`] as stored in the `invoices`
//! tree. Fields are written in a fixed order:
//!
//! | # | Field            | Encoding                                  |
//! |---|------------------|-------------------------------------------|
//! | 1 | memo             | varint length + bytes (cap 1024)          |
//! | 2 | receipt          | varint length + bytes (cap 1024)          |
//! | 3 | creation date    | varint length + timestamp (cap 300)       |
//! | 4 | payment preimage | 32 raw bytes                              |
//! | 5 | value            | 8 bytes BE (two's complement of the i64)  |
//! | 6 | settled          | 1 byte, `1` = settled, anything else not  |
//!
//! Varints are Bitcoin's CompactSize. The timestamp payload is a version
//! byte followed by big-endian Unix seconds (i64) and nanoseconds (u32).
//! A leap second is stored the way chrono represents it: second `:59` with
//! nanoseconds in `1e9..2e9`.
//!
//! Caps are only enforced on decode. Encode trusts that
//! [`Invoice::validate`] already ran.

use chrono::{DateTime, Utc};

use crate::config::{MAX_MEMO_SIZE, MAX_RECEIPT_SIZE, MAX_TIMESTAMP_SIZE, PAYMENT_HASH_LENGTH};
use crate::error::{InvoiceError, InvoiceResult};
use crate::types::{ContractTerm, Invoice, PaymentPreimage};

const TIMESTAMP_VERSION: u8 = 1;
const TIMESTAMP_LEN: usize = 1 + 8 + 4;
const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Serialize an invoice into its on-disk form.
pub fn encode_invoice(invoice: &Invoice) -> Vec<u8> {
    let mut buf = Vec::with_capacity(
        invoice.memo.len() + invoice.receipt.len() + TIMESTAMP_LEN + PAYMENT_HASH_LENGTH + 9 + 9,
    );

    write_var_bytes(&mut buf, &invoice.memo);
    write_var_bytes(&mut buf, &invoice.receipt);
    write_var_bytes(&mut buf, &encode_timestamp(&invoice.creation_date));

    buf.extend_from_slice(invoice.terms.payment_preimage.as_bytes());
    buf.extend_from_slice(&(invoice.terms.value as u64).to_be_bytes());
    buf.push(u8::from(invoice.terms.settled));

    buf
}

/// Parse an invoice from its on-disk form.
///
/// Fails with [`InvoiceError::MalformedRecord`] on an oversized length
/// prefix, a truncated field, or a timestamp that does not parse.
pub fn decode_invoice(bytes: &[u8]) -> InvoiceResult<Invoice> {
    let mut reader = Reader::new(bytes);

    let memo = reader.read_var_bytes(MAX_MEMO_SIZE, "memo")?.to_vec();
    let receipt = reader.read_var_bytes(MAX_RECEIPT_SIZE, "receipt")?.to_vec();
    let creation_date = decode_timestamp(reader.read_var_bytes(MAX_TIMESTAMP_SIZE, "creation date")?)?;

    let preimage: [u8; PAYMENT_HASH_LENGTH] = reader.read_array("payment preimage")?;
    let value = u64::from_be_bytes(reader.read_array("value")?) as i64;
    let [settle_byte] = reader.read_array::<1>("settled flag")?;

    Ok(Invoice {
        memo,
        receipt,
        creation_date,
        terms: ContractTerm {
            payment_preimage: PaymentPreimage::new(preimage),
            value,
            settled: settle_byte == 1,
        },
    })
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

fn encode_timestamp(ts: &DateTime<Utc>) -> [u8; TIMESTAMP_LEN] {
    let mut out = [0u8; TIMESTAMP_LEN];
    out[0] = TIMESTAMP_VERSION;
    out[1..9].copy_from_slice(&ts.timestamp().to_be_bytes());
    out[9..13].copy_from_slice(&ts.timestamp_subsec_nanos().to_be_bytes());
    out
}

fn decode_timestamp(bytes: &[u8]) -> InvoiceResult<DateTime<Utc>> {
    if bytes.len() != TIMESTAMP_LEN {
        return Err(InvoiceError::malformed(format!(
            "creation date must be {TIMESTAMP_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    if bytes[0] != TIMESTAMP_VERSION {
        return Err(InvoiceError::malformed(format!(
            "unsupported creation date version {}",
            bytes[0]
        )));
    }

    let mut secs = [0u8; 8];
    secs.copy_from_slice(&bytes[1..9]);
    let mut nanos = [0u8; 4];
    nanos.copy_from_slice(&bytes[9..13]);
    let secs = i64::from_be_bytes(secs);
    let nanos = u32::from_be_bytes(nanos);

    // Leap nanos are only valid on the last second of a minute.
    let leap = nanos >= NANOS_PER_SEC;
    if nanos >= 2 * NANOS_PER_SEC || (leap && secs.rem_euclid(60) != 59) {
        return Err(InvoiceError::malformed(format!(
            "creation date nanoseconds out of range: {nanos} at {secs}s"
        )));
    }

    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| InvoiceError::malformed(format!("creation date out of range: {secs}s")))
}

// ---------------------------------------------------------------------------
// CompactSize varints
// ---------------------------------------------------------------------------

fn write_var_int(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => buf.push(n as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}

fn write_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_var_int(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Cursor over a record with bounds-checked reads.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize, field: &str) -> InvoiceResult<&'a [u8]> {
        let remaining = self.bytes.len() - self.pos;
        if remaining < n {
            return Err(InvoiceError::malformed(format!(
                "truncated {field}: need {n} bytes, have {remaining}"
            )));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self, field: &str) -> InvoiceResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn read_var_int(&mut self, field: &str) -> InvoiceResult<u64> {
        let [prefix] = self.read_array::<1>(field)?;
        let (n, min) = match prefix {
            0xfd => (u16::from_le_bytes(self.read_array(field)?) as u64, 0xfd),
            0xfe => (u32::from_le_bytes(self.read_array(field)?) as u64, 0x1_0000),
            0xff => (u64::from_le_bytes(self.read_array(field)?), 0x1_0000_0000),
            small => return Ok(small as u64),
        };
        if n < min {
            return Err(InvoiceError::malformed(format!(
                "non-canonical length prefix for {field}"
            )));
        }
        Ok(n)
    }

    fn read_var_bytes(&mut self, max: usize, field: &str) -> InvoiceResult<&'a [u8]> {
        let len = self.read_var_int(field)?;
        if len > max as u64 {
            return Err(InvoiceError::malformed(format!(
                "{field} is {len} bytes, max is {max}"
            )));
        }
        self.take(len as usize, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn sample_invoice() -> Invoice {
        Invoice::new(PaymentPreimage::new([0x42; 32]), 1000)
            .with_memo("coffee")
            .with_receipt(vec![0xde, 0xad, 0xbe, 0xef])
            .with_creation_date(Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap())
    }

    #[test]
    fn roundtrip_preserves_every_field() {
        let mut invoice = sample_invoice();
        invoice.creation_date = invoice.creation_date + chrono::Duration::nanoseconds(535_897_932);
        let decoded = decode_invoice(&encode_invoice(&invoice)).unwrap();
        assert_eq!(decoded, invoice);
    }

    #[test]
    fn roundtrip_empty_fields_and_negative_value() {
        let mut invoice = Invoice::new(PaymentPreimage::new([0u8; 32]), -5);
        invoice.terms.settled = true;
        let decoded = decode_invoice(&encode_invoice(&invoice)).unwrap();
        assert_eq!(decoded, invoice);
        assert_eq!(decoded.terms.value, -5);
    }

    #[test]
    fn roundtrip_max_sized_fields_uses_three_byte_prefix() {
        let invoice = sample_invoice()
            .with_memo(vec![b'm'; MAX_MEMO_SIZE])
            .with_receipt(vec![b'r'; MAX_RECEIPT_SIZE]);
        let bytes = encode_invoice(&invoice);
        assert_eq!(&bytes[..3], &[0xfd, 0x00, 0x04]);
        assert_eq!(decode_invoice(&bytes).unwrap(), invoice);
    }

    #[test]
    fn encoding_layout_is_stable() {
        let invoice = sample_invoice();
        let bytes = encode_invoice(&invoice);

        // memo: len 6 + "coffee"
        assert_eq!(bytes[0], 6);
        assert_eq!(&bytes[1..7], b"coffee");
        // receipt: len 4 + payload
        assert_eq!(bytes[7], 4);
        assert_eq!(&bytes[8..12], &[0xde, 0xad, 0xbe, 0xef]);
        // creation date: len 13, version 1
        assert_eq!(bytes[12], TIMESTAMP_LEN as u8);
        assert_eq!(bytes[13], TIMESTAMP_VERSION);
        let tail = &bytes[13 + TIMESTAMP_LEN..];
        assert_eq!(&tail[..32], &[0x42; 32]);
        assert_eq!(&tail[32..40], &1000u64.to_be_bytes());
        assert_eq!(tail[40], 0);
        assert_eq!(tail.len(), 41);
    }

    #[test]
    fn value_is_big_endian_twos_complement() {
        let invoice = Invoice::new(PaymentPreimage::new([1u8; 32]), -1);
        let bytes = encode_invoice(&invoice);
        let n = bytes.len();
        assert_eq!(&bytes[n - 9..n - 1], &[0xff; 8]);
    }

    #[test]
    fn any_non_one_settle_byte_is_unsettled() {
        let mut bytes = encode_invoice(&sample_invoice());
        let last = bytes.len() - 1;
        bytes[last] = 2;
        assert!(!decode_invoice(&bytes).unwrap().terms.settled);
        bytes[last] = 1;
        assert!(decode_invoice(&bytes).unwrap().terms.settled);
    }

    #[test]
    fn oversized_memo_prefix_is_rejected() {
        let mut bytes = Vec::new();
        write_var_int(&mut bytes, (MAX_MEMO_SIZE + 1) as u64);
        bytes.extend(vec![0u8; MAX_MEMO_SIZE + 1]);
        assert!(matches!(
            decode_invoice(&bytes),
            Err(InvoiceError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn oversized_timestamp_prefix_is_rejected() {
        let mut bytes = vec![0u8, 0u8];
        write_var_int(&mut bytes, (MAX_TIMESTAMP_SIZE + 1) as u64);
        let err = decode_invoice(&bytes).unwrap_err();
        assert!(err.to_string().contains("creation date"));
    }

    #[test]
    fn truncated_record_is_rejected_at_every_cut() {
        let bytes = encode_invoice(&sample_invoice());
        for cut in 0..bytes.len() {
            assert!(
                matches!(
                    decode_invoice(&bytes[..cut]),
                    Err(InvoiceError::MalformedRecord { .. })
                ),
                "cut at {cut} should fail"
            );
        }
    }

    #[test]
    fn unparsable_timestamp_is_rejected() {
        let mut bytes = encode_invoice(&sample_invoice());
        // Memo (7) + receipt (5) + timestamp prefix (1) puts the version at 13.
        bytes[13] = 9;
        assert!(matches!(
            decode_invoice(&bytes),
            Err(InvoiceError::MalformedRecord { .. })
        ));

        let mut bytes = encode_invoice(&sample_invoice());
        bytes[22..26].copy_from_slice(&NANOS_PER_SEC.to_be_bytes());
        assert!(matches!(
            decode_invoice(&bytes),
            Err(InvoiceError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn leap_second_creation_date_roundtrips() {
        let leap = NaiveDate::from_ymd_opt(2016, 12, 31)
            .and_then(|d| d.and_hms_nano_opt(23, 59, 59, 1_500_000_000))
            .unwrap();
        let invoice = sample_invoice().with_creation_date(Utc.from_utc_datetime(&leap));
        assert!(invoice.validate().is_ok());

        let bytes = encode_invoice(&invoice);
        assert_eq!(&bytes[22..26], &1_500_000_000u32.to_be_bytes());
        let decoded = decode_invoice(&bytes).unwrap();
        assert_eq!(decoded, invoice);
        assert_eq!(decoded.creation_date.timestamp_subsec_nanos(), 1_500_000_000);
    }

    #[test]
    fn leap_nanos_off_the_last_second_are_rejected() {
        let mut bytes = encode_invoice(&sample_invoice());
        // The sample date sits on second :26, so this is not a leap second.
        bytes[22..26].copy_from_slice(&1_500_000_000u32.to_be_bytes());
        assert!(matches!(
            decode_invoice(&bytes),
            Err(InvoiceError::MalformedRecord { .. })
        ));

        let at_59 = sample_invoice()
            .with_creation_date(Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 59).unwrap());
        let mut bytes = encode_invoice(&at_59);
        bytes[22..26].copy_from_slice(&(2 * NANOS_PER_SEC).to_be_bytes());
        assert!(matches!(
            decode_invoice(&bytes),
            Err(InvoiceError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn non_canonical_varint_is_rejected() {
        // 0xfd prefix carrying a value that fits in one byte.
        let bytes = [0xfd, 0x05, 0x00];
        assert!(matches!(
            decode_invoice(&bytes),
            Err(InvoiceError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let invoice = sample_invoice();
        let mut bytes = encode_invoice(&invoice);
        bytes.extend_from_slice(b"future");
        assert_eq!(decode_invoice(&bytes).unwrap(), invoice);
    }
}
