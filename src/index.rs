//! Hash index over transaction handles.
//!
//! The index maps a bucket computed from (Call-ID, CSeq number) to a chain of
//! handles. It knows nothing about matching rules: the manager walks the chain
//! and applies the rule for the lookup's intent. Capacity is fixed at
//! construction; insertion beyond it fails with
//! [`Error::ResourceExhausted`](crate::error::Error::ResourceExhausted).

use crate::error::{Error, Result};
use crate::transaction::TransactionHandle;

/// Where an indexed transaction sits: its bucket and its position in the
/// chain. Stored on the record so removal needs no scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BucketRef {
    pub bucket: usize,
    pub pos: usize,
}

/// One mixing round of the bucket hash.
fn mix_round(mut s: u32, bytes: &[u8]) -> u32 {
    for &b in bytes {
        s = s.wrapping_add(u32::from(b));
        s = s.wrapping_add(s << 10);
        s ^= s >> 6;
    }
    s = s.wrapping_add(s << 3);
    s ^= s >> 11;
    s.wrapping_add(s << 15)
}

/// Computes the bucket for a (Call-ID, CSeq) pair.
///
/// Streaming add/shift/xor mix over 32-byte chunks of the Call-ID, one
/// finalization per chunk, then a last round over the leftover bytes and the
/// decimal rendering of the CSeq number.
pub(crate) fn bucket_for(call_id: &str, cseq: u32, modulus: usize) -> usize {
    let bytes = call_id.as_bytes();
    let mut s: u32 = 0;

    let mut chunks = bytes.chunks_exact(32);
    for chunk in &mut chunks {
        s = mix_round(s, chunk);
    }

    let mut tail = chunks.remainder().to_vec();
    tail.extend_from_slice(cseq.to_string().as_bytes());
    s = mix_round(s, &tail);

    (s as usize) % modulus
}

/// Fixed-capacity bucket-chain index.
#[derive(Debug)]
pub(crate) struct HashIndex {
    buckets: Vec<Vec<TransactionHandle>>,
    len: usize,
    capacity: usize,
}

impl HashIndex {
    pub fn new(capacity: usize) -> Self {
        let bucket_count = (capacity * 2).max(16);
        Self {
            buckets: (0..bucket_count).map(|_| Vec::new()).collect(),
            len: 0,
            capacity,
        }
    }

    pub fn bucket_of(&self, call_id: &str, cseq: u32) -> usize {
        bucket_for(call_id, cseq, self.buckets.len())
    }

    /// Appends `handle` to the chain of `bucket` and returns its position,
    /// which the caller stores for O(1) removal.
    pub fn insert(&mut self, bucket: usize, handle: TransactionHandle) -> Result<usize> {
        if self.len >= self.capacity {
            return Err(Error::ResourceExhausted("transaction index"));
        }
        let chain = &mut self.buckets[bucket];
        chain.push(handle);
        self.len += 1;
        Ok(chain.len() - 1)
    }

    /// Removes `handle` from position `pos` of `bucket` without scanning.
    /// A mismatched handle at that position is a no-op, which makes removal
    /// idempotent.
    ///
    /// Returns the handle that was relocated into `pos` by the swap, if any;
    /// the caller must update that transaction's stored position.
    pub fn remove(
        &mut self,
        bucket: usize,
        pos: usize,
        handle: TransactionHandle,
    ) -> Option<TransactionHandle> {
        let chain = &mut self.buckets[bucket];
        if chain.get(pos) != Some(&handle) {
            return None;
        }
        chain.swap_remove(pos);
        self.len -= 1;
        chain.get(pos).copied()
    }

    pub fn chain(&self, bucket: usize) -> &[TransactionHandle] {
        &self.buckets[bucket]
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_in_range() {
        for modulus in [16, 97, 1024] {
            let a = bucket_for("call-id-abc@host.example.com", 314, modulus);
            let b = bucket_for("call-id-abc@host.example.com", 314, modulus);
            assert_eq!(a, b);
            assert!(a < modulus);
        }
    }

    #[test]
    fn cseq_participates_in_hash() {
        // Not guaranteed for every input, but these two are known to differ.
        let a = bucket_for("call-id-abc@host.example.com", 1, 1024);
        let b = bucket_for("call-id-abc@host.example.com", 2, 1024);
        assert_ne!(a, b);
    }

    #[test]
    fn long_call_ids_use_chunked_mixing() {
        let long: String = "x".repeat(100);
        let a = bucket_for(&long, 7, 512);
        assert!(a < 512);
        // A one-byte change anywhere must be able to move the bucket.
        let mut other = long.clone();
        other.replace_range(50..51, "y");
        let b = bucket_for(&other, 7, 512);
        assert_ne!(a, b);
    }

    #[test]
    fn insert_fails_at_capacity() {
        let mut index = HashIndex::new(2);
        let b = index.bucket_of("c1", 1);
        assert_eq!(index.insert(b, TransactionHandle::new(0, 1)).unwrap(), 0);
        assert_eq!(index.insert(b, TransactionHandle::new(1, 1)).unwrap(), 1);
        let err = index.insert(b, TransactionHandle::new(2, 1)).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted(_)));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut index = HashIndex::new(4);
        let h = TransactionHandle::new(0, 1);
        let b = index.bucket_of("c1", 1);
        let pos = index.insert(b, h).unwrap();
        index.remove(b, pos, h);
        assert_eq!(index.len(), 0);
        index.remove(b, pos, h);
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn remove_reports_the_relocated_tail_handle() {
        let mut index = HashIndex::new(4);
        let h0 = TransactionHandle::new(0, 1);
        let h1 = TransactionHandle::new(1, 1);
        let h2 = TransactionHandle::new(2, 1);
        let b = index.bucket_of("c1", 1);
        index.insert(b, h0).unwrap();
        index.insert(b, h1).unwrap();
        index.insert(b, h2).unwrap();

        // The tail is swapped into the vacated position.
        assert_eq!(index.remove(b, 0, h0), Some(h2));
        assert_eq!(index.chain(b), &[h2, h1]);

        // Removing the tail relocates nothing.
        assert_eq!(index.remove(b, 1, h1), None);
        assert_eq!(index.chain(b), &[h2]);
    }

    #[test]
    fn remove_ignores_a_mismatched_handle() {
        let mut index = HashIndex::new(4);
        let h0 = TransactionHandle::new(0, 1);
        let b = index.bucket_of("c1", 1);
        let pos = index.insert(b, h0).unwrap();
        index.remove(b, pos, TransactionHandle::new(9, 9));
        assert_eq!(index.len(), 1);
        assert_eq!(index.chain(b), &[h0]);
    }

    #[test]
    fn removed_slot_frees_capacity() {
        let mut index = HashIndex::new(1);
        let b = index.bucket_of("c1", 1);
        let pos = index.insert(b, TransactionHandle::new(0, 1)).unwrap();
        index.remove(b, pos, TransactionHandle::new(0, 1));
        index.insert(b, TransactionHandle::new(0, 2)).unwrap();
        assert_eq!(index.chain(b), &[TransactionHandle::new(0, 2)]);
    }
}
