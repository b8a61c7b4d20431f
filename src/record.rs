//! Fixed-size vault record
//!
//! Layout (16 bytes, no padding):
//! - digest (10 bytes): BLAKE3 of the nonce, truncated
//! - nonce (6 bytes): uniformly random
//!
//! Records order by unsigned byte-wise comparison of all 16 bytes, which is
//! the same as comparing the digest first and breaking ties by nonce. Prefix
//! search relies on this: any leading-bytes comparison of the digest is
//! monotonic with respect to the full-record order. Sorting by nonce first
//! would break search.

use std::fmt;

pub const DIGEST_SIZE: usize = 10;
pub const NONCE_SIZE: usize = 6;
pub const RECORD_SIZE: usize = DIGEST_SIZE + NONCE_SIZE;

pub type Nonce = [u8; NONCE_SIZE];

/// One 16-byte record: `digest(10) || nonce(6)`
///
/// The derived `Ord` on the byte array is exactly the vault sort order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Record([u8; RECORD_SIZE]);

impl Record {
    pub const SIZE: usize = RECORD_SIZE;

    /// Build a record from a nonce, computing its digest
    pub fn from_nonce(nonce: Nonce) -> Self {
        let digest = digest_of(&nonce);
        let mut buf = [0u8; RECORD_SIZE];
        buf[..DIGEST_SIZE].copy_from_slice(&digest);
        buf[DIGEST_SIZE..].copy_from_slice(&nonce);
        Self(buf)
    }

    /// Wrap raw bytes as stored in a vault file. No digest check happens here.
    pub fn from_bytes(buf: [u8; RECORD_SIZE]) -> Self {
        Self(buf)
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; RECORD_SIZE] {
        &self.0
    }

    pub fn digest(&self) -> &[u8] {
        &self.0[..DIGEST_SIZE]
    }

    pub fn nonce(&self) -> Nonce {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&self.0[DIGEST_SIZE..]);
        nonce
    }

    /// Nonce read as a little-endian integer (the dump format)
    pub fn nonce_value(&self) -> u64 {
        self.0[DIGEST_SIZE..]
            .iter()
            .rev()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
    }

    /// Leading `len` bytes of the digest
    pub fn prefix(&self, len: usize) -> &[u8] {
        &self.0[..len.min(DIGEST_SIZE)]
    }

    /// True when the stored digest matches the hash of the stored nonce
    pub fn is_consistent(&self) -> bool {
        digest_of(&self.nonce())[..] == self.0[..DIGEST_SIZE]
    }

    /// `[byte offset] digest-hex nonce=decimal` for the record at `index`
    pub fn dump_line(&self, index: u64) -> String {
        format!(
            "[{}] {} nonce={}",
            index * RECORD_SIZE as u64,
            hex::encode(self.digest()),
            self.nonce_value()
        )
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Record({} nonce={})",
            hex::encode(self.digest()),
            self.nonce_value()
        )
    }
}

/// First 10 bytes of the 32-byte BLAKE3 hash of a nonce
pub fn digest_of(nonce: &Nonce) -> [u8; DIGEST_SIZE] {
    let hash = blake3::hash(nonce);
    let mut out = [0u8; DIGEST_SIZE];
    out.copy_from_slice(&hash.as_bytes()[..DIGEST_SIZE]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        let nonce = [1, 2, 3, 4, 5, 6];
        let record = Record::from_nonce(nonce);
        let bytes = record.to_bytes();

        assert_eq!(&bytes[..DIGEST_SIZE], &digest_of(&nonce));
        assert_eq!(&bytes[DIGEST_SIZE..], &nonce);
        assert_eq!(record.nonce(), nonce);
        assert!(record.is_consistent());
    }

    #[test]
    fn test_digest_is_truncated_blake3() {
        assert_eq!(
            hex::encode(digest_of(&[1, 2, 3, 4, 5, 6])),
            "828a8660ae86b86f1ebf"
        );
        assert_eq!(
            hex::encode(digest_of(&[0; NONCE_SIZE])),
            "3dbd5a09e7a3cb057655"
        );
    }

    #[test]
    fn test_nonce_value_is_little_endian() {
        let record = Record::from_nonce([0x01, 0x02, 0, 0, 0, 0]);
        assert_eq!(record.nonce_value(), 0x0201);
    }

    #[test]
    fn test_ordering_is_digest_then_nonce() {
        let mut a = [0u8; RECORD_SIZE];
        let mut b = [0u8; RECORD_SIZE];
        a[0] = 0x10;
        a[DIGEST_SIZE] = 0xFF;
        b[0] = 0x11;
        b[DIGEST_SIZE] = 0x00;
        assert!(Record::from_bytes(a) < Record::from_bytes(b));

        // equal digests fall through to the nonce
        b[0] = 0x10;
        assert!(Record::from_bytes(b) < Record::from_bytes(a));
    }

    #[test]
    fn test_ordering_is_unsigned() {
        let mut low = [0u8; RECORD_SIZE];
        let mut high = [0u8; RECORD_SIZE];
        low[0] = 0x7F;
        high[0] = 0x80;
        assert!(Record::from_bytes(low) < Record::from_bytes(high));
    }

    #[test]
    fn test_tampered_record_is_inconsistent() {
        let mut bytes = Record::from_nonce([9; NONCE_SIZE]).to_bytes();
        bytes[DIGEST_SIZE + 1] ^= 0x01;
        assert!(!Record::from_bytes(bytes).is_consistent());
    }

    #[test]
    fn test_dump_line() {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[0] = 0xAB;
        bytes[DIGEST_SIZE] = 0x05;
        let line = Record::from_bytes(bytes).dump_line(2);
        assert_eq!(line, "[32] ab000000000000000000 nonce=5");
    }

    #[test]
    fn test_prefix() {
        let record = Record::from_bytes([0xAB; RECORD_SIZE]);
        assert_eq!(record.prefix(3), &[0xAB, 0xAB, 0xAB]);
        assert_eq!(record.prefix(64).len(), DIGEST_SIZE);
    }
}
