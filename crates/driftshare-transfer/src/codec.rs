//! Splitting files into indexed chunks and putting them back together.
//!
//! All functions are pure. Slices share the source buffer (`Bytes`), so
//! splitting a file does not copy it.

use std::ops::Range;

use bytes::{Bytes, BytesMut};

use crate::error::CodecError;

/// One index-tagged slice of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u32,
    pub data: Bytes,
}

/// Number of chunks for `size` bytes: `ceil(size / chunk_size)`.
///
/// # Panics
/// Panics if `chunk_size` is zero.
pub fn chunk_count(size: u64, chunk_size: usize) -> u32 {
    assert!(chunk_size > 0, "chunk size must be non-zero");
    size.div_ceil(chunk_size as u64) as u32
}

/// Byte range of chunk `index` within a file of `size` bytes.
pub fn chunk_range(size: u64, chunk_size: usize, index: u32) -> Range<usize> {
    let start = (index as u64 * chunk_size as u64).min(size) as usize;
    let end = (start as u64 + chunk_size as u64).min(size) as usize;
    start..end
}

/// Slice chunk `index` out of `data`.
pub fn chunk_at(data: &Bytes, chunk_size: usize, index: u32) -> Chunk {
    let range = chunk_range(data.len() as u64, chunk_size, index);
    Chunk {
        index,
        data: data.slice(range),
    }
}

/// Split `data` into ordered chunks of `chunk_size` bytes.
pub fn split(data: &Bytes, chunk_size: usize) -> Vec<Chunk> {
    let total = chunk_count(data.len() as u64, chunk_size);
    (0..total).map(|i| chunk_at(data, chunk_size, i)).collect()
}

/// Concatenate a complete slot set in index order.
///
/// Fails on the first empty slot.
pub fn reassemble(slots: &[Option<Bytes>]) -> Result<Bytes, CodecError> {
    let mut total_len = 0;
    for (i, slot) in slots.iter().enumerate() {
        match slot {
            Some(data) => total_len += data.len(),
            None => return Err(CodecError::MissingChunk(i as u32)),
        }
    }

    let mut out = BytesMut::with_capacity(total_len);
    for data in slots.iter().flatten() {
        out.extend_from_slice(data);
    }
    Ok(out.freeze())
}

/// Indices of empty slots.
pub fn missing_slots(slots: &[Option<Bytes>]) -> Vec<u32> {
    slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_none())
        .map(|(i, _)| i as u32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CHUNK_SIZE;

    fn pattern(len: usize) -> Bytes {
        (0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>().into()
    }

    #[test]
    fn count_is_ceiling() {
        assert_eq!(chunk_count(0, 4), 0);
        assert_eq!(chunk_count(1, 4), 1);
        assert_eq!(chunk_count(4, 4), 1);
        assert_eq!(chunk_count(5, 4), 2);
        assert_eq!(chunk_count(CHUNK_SIZE as u64 * 3, CHUNK_SIZE), 3);
        assert_eq!(chunk_count(CHUNK_SIZE as u64 * 3 + 1, CHUNK_SIZE), 4);
    }

    #[test]
    fn lengths_sum_to_size() {
        for size in [0usize, 1, 3, 4, 5, 17, 64, 1000] {
            let data = pattern(size);
            let chunks = split(&data, 4);
            assert_eq!(chunks.len() as u32, chunk_count(size as u64, 4));
            assert_eq!(chunks.iter().map(|c| c.data.len()).sum::<usize>(), size);
            for (i, c) in chunks.iter().enumerate() {
                assert_eq!(c.index, i as u32);
                if i + 1 < chunks.len() {
                    assert_eq!(c.data.len(), 4);
                }
            }
        }
    }

    #[test]
    fn six_hundred_thousand_bytes() {
        let data = pattern(600_000);
        let chunks = split(&data, CHUNK_SIZE);
        let lens: Vec<usize> = chunks.iter().map(|c| c.data.len()).collect();
        assert_eq!(lens, vec![262_144, 262_144, 75_712]);

        let slots: Vec<Option<Bytes>> = chunks.into_iter().map(|c| Some(c.data)).collect();
        assert_eq!(reassemble(&slots).unwrap(), data);
    }

    #[test]
    fn any_arrival_order_reassembles() {
        let data = pattern(37);
        let mut chunks = split(&data, 5);
        // Deterministic shuffle: reverse, then rotate.
        chunks.reverse();
        chunks.rotate_left(3);

        let mut slots = vec![None; chunks.len()];
        for c in chunks {
            slots[c.index as usize] = Some(c.data);
        }
        assert_eq!(reassemble(&slots).unwrap(), data);
    }

    #[test]
    fn empty_slot_is_reported() {
        let slots = vec![Some(Bytes::from_static(b"ab")), None, Some(Bytes::new()), None];
        assert_eq!(reassemble(&slots), Err(CodecError::MissingChunk(1)));
        assert_eq!(missing_slots(&slots), vec![1, 3]);
    }

    #[test]
    fn range_past_end_is_empty() {
        assert_eq!(chunk_range(10, 4, 2), 8..10);
        assert_eq!(chunk_range(10, 4, 3), 10..10);
    }
}
