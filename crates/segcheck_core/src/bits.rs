//! Liveness bits and document iteration.
//!
//! A segment's live docs are a logical sequence of booleans indexed by
//! [`DocId`]. Codecs consume them through the [`Bits`] trait only: a concrete
//! [`FixedBitSet`] and an opaque [`PredicateBits`] must produce identical
//! files.

use crate::error::{CoreError, CoreResult};
use crate::types::DocId;
use std::fmt;
use std::sync::Arc;

/// Sentinel returned by [`DocIterator`] once exhausted.
pub const NO_MORE_DOCS: DocId = DocId::MAX;

/// Read-only random access to a fixed-length sequence of bits.
pub trait Bits: Send + Sync {
    /// Returns the bit at `index`.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `index >= self.len()`.
    fn get(&self, index: DocId) -> bool;

    /// Number of addressable bits.
    fn len(&self) -> u32;

    /// Returns `true` if there are no addressable bits.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concrete bitset behind this view, if any.
    ///
    /// Writers may use it as a fast path, but must produce the same output
    /// when it returns `None`.
    fn as_fixed_bitset(&self) -> Option<&FixedBitSet> {
        None
    }
}

impl<B: Bits + ?Sized> Bits for Arc<B> {
    fn get(&self, index: DocId) -> bool {
        (**self).get(index)
    }

    fn len(&self) -> u32 {
        (**self).len()
    }

    fn as_fixed_bitset(&self) -> Option<&FixedBitSet> {
        (**self).as_fixed_bitset()
    }
}

/// Counts set bits of any [`Bits`], using the word-level count when possible.
#[must_use]
pub fn cardinality(bits: &dyn Bits) -> u64 {
    match bits.as_fixed_bitset() {
        Some(set) => set.cardinality(),
        None => (0..bits.len()).filter(|&i| bits.get(i)).count() as u64,
    }
}

/// Number of 64-bit words needed to hold `num_bits` bits.
///
/// Computed in 64-bit arithmetic so lengths near `u32::MAX` do not wrap.
#[must_use]
pub const fn bits_to_words(num_bits: u32) -> usize {
    ((num_bits as u64 + 63) >> 6) as usize
}

/// A fixed-size bitset backed by 64-bit words.
#[derive(Clone, PartialEq, Eq)]
pub struct FixedBitSet {
    words: Vec<u64>,
    num_bits: u32,
}

impl FixedBitSet {
    /// Creates a bitset with every bit clear.
    #[must_use]
    pub fn new(num_bits: u32) -> Self {
        Self {
            words: vec![0; bits_to_words(num_bits)],
            num_bits,
        }
    }

    /// Creates a bitset with every bit set.
    #[must_use]
    pub fn full(num_bits: u32) -> Self {
        let mut set = Self {
            words: vec![u64::MAX; bits_to_words(num_bits)],
            num_bits,
        };
        set.clear_ghost_bits();
        set
    }

    /// Wraps existing words.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the word count does not
    /// match `num_bits` or bits beyond `num_bits` are set.
    pub fn from_words(words: Vec<u64>, num_bits: u32) -> CoreResult<Self> {
        if words.len() != bits_to_words(num_bits) {
            return Err(CoreError::invalid_argument(format!(
                "{} words cannot hold exactly {num_bits} bits",
                words.len()
            )));
        }
        let set = Self { words, num_bits };
        if set.ghost_bits() != 0 {
            return Err(CoreError::invalid_argument(
                "bits set beyond the declared length",
            ));
        }
        Ok(set)
    }

    /// Backing words, least significant bit first.
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Sets the bit at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn set(&mut self, index: DocId) {
        assert!(index < self.num_bits, "index {index} out of bounds for {} bits", self.num_bits);
        self.words[(index >> 6) as usize] |= 1u64 << (index & 63);
    }

    /// Clears the bit at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn clear(&mut self, index: DocId) {
        assert!(index < self.num_bits, "index {index} out of bounds for {} bits", self.num_bits);
        self.words[(index >> 6) as usize] &= !(1u64 << (index & 63));
    }

    /// Number of set bits.
    #[must_use]
    pub fn cardinality(&self) -> u64 {
        self.words.iter().map(|w| u64::from(w.count_ones())).sum()
    }

    /// Index of the first set bit at or after `from`.
    #[must_use]
    pub fn next_set_bit(&self, from: DocId) -> Option<DocId> {
        if from >= self.num_bits {
            return None;
        }
        let mut word_index = (from >> 6) as usize;
        let mut word = self.words[word_index] >> (from & 63);
        if word != 0 {
            return Some(from + word.trailing_zeros());
        }
        word_index += 1;
        while word_index < self.words.len() {
            word = self.words[word_index];
            if word != 0 {
                return Some((word_index as u32) * 64 + word.trailing_zeros());
            }
            word_index += 1;
        }
        None
    }

    /// Iterates over the indices of set bits in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = DocId> + '_ {
        std::iter::successors(self.next_set_bit(0), move |&i| {
            i.checked_add(1).and_then(|next| self.next_set_bit(next))
        })
    }

    fn ghost_bits(&self) -> u64 {
        let used = self.num_bits & 63;
        match self.words.last() {
            Some(&last) if used != 0 => last & !((1u64 << used) - 1),
            _ => 0,
        }
    }

    fn clear_ghost_bits(&mut self) {
        let used = self.num_bits & 63;
        if used != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << used) - 1;
            }
        }
    }
}

impl Bits for FixedBitSet {
    fn get(&self, index: DocId) -> bool {
        assert!(index < self.num_bits, "index {index} out of bounds for {} bits", self.num_bits);
        self.words[(index >> 6) as usize] & (1u64 << (index & 63)) != 0
    }

    fn len(&self) -> u32 {
        self.num_bits
    }

    fn as_fixed_bitset(&self) -> Option<&FixedBitSet> {
        Some(self)
    }
}

impl fmt::Debug for FixedBitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedBitSet")
            .field("num_bits", &self.num_bits)
            .field("cardinality", &self.cardinality())
            .finish()
    }
}

/// Bits defined by an index predicate, with no concrete storage to inspect.
pub struct PredicateBits<F> {
    len: u32,
    predicate: F,
}

impl<F> PredicateBits<F>
where
    F: Fn(DocId) -> bool + Send + Sync,
{
    /// Creates predicate bits of declared length `len`.
    pub fn new(len: u32, predicate: F) -> Self {
        Self { len, predicate }
    }
}

impl<F> Bits for PredicateBits<F>
where
    F: Fn(DocId) -> bool + Send + Sync,
{
    fn get(&self, index: DocId) -> bool {
        assert!(index < self.len, "index {index} out of bounds for {} bits", self.len);
        (self.predicate)(index)
    }

    fn len(&self) -> u32 {
        self.len
    }
}

impl<F> fmt::Debug for PredicateBits<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateBits").field("len", &self.len).finish()
    }
}

/// Bits where every index is set; used for segments without deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchAllBits {
    len: u32,
}

impl MatchAllBits {
    /// Creates all-set bits of length `len`.
    #[must_use]
    pub const fn new(len: u32) -> Self {
        Self { len }
    }
}

impl Bits for MatchAllBits {
    fn get(&self, index: DocId) -> bool {
        assert!(index < self.len, "index {index} out of bounds for {} bits", self.len);
        true
    }

    fn len(&self) -> u32 {
        self.len
    }
}

/// Forward-only iterator over ascending document ids.
///
/// Both methods return [`NO_MORE_DOCS`] once exhausted.
pub trait DocIterator: Send {
    /// Current document, `None` before the first call to `next_doc`/`advance`.
    fn doc_id(&self) -> Option<DocId>;

    /// Moves to the next document.
    ///
    /// # Errors
    ///
    /// Asserting implementations return [`CoreError::ContractViolation`]
    /// when called after exhaustion.
    fn next_doc(&mut self) -> CoreResult<DocId>;

    /// Moves to the first document `>= target`.
    ///
    /// # Errors
    ///
    /// Asserting implementations return [`CoreError::ContractViolation`]
    /// when `target` does not move forward.
    fn advance(&mut self, target: DocId) -> CoreResult<DocId>;

    /// Upper bound on the number of documents this iterator visits.
    fn cost(&self) -> u64;
}

/// Iterates the set indices of a [`Bits`].
pub struct LiveDocsIterator {
    bits: Arc<dyn Bits>,
    doc: Option<DocId>,
}

impl LiveDocsIterator {
    /// Creates an iterator positioned before the first document.
    pub fn new(bits: Arc<dyn Bits>) -> Self {
        Self { bits, doc: None }
    }

    fn scan_from(&mut self, from: u64) -> DocId {
        let len = u64::from(self.bits.len());
        let found = match self.bits.as_fixed_bitset() {
            Some(set) if from < len => set.next_set_bit(from as DocId),
            Some(_) => None,
            None => (from..len).find(|&i| self.bits.get(i as DocId)).map(|i| i as DocId),
        };
        let doc = found.unwrap_or(NO_MORE_DOCS);
        self.doc = Some(doc);
        doc
    }
}

impl DocIterator for LiveDocsIterator {
    fn doc_id(&self) -> Option<DocId> {
        self.doc
    }

    fn next_doc(&mut self) -> CoreResult<DocId> {
        let from = match self.doc {
            None => 0,
            Some(NO_MORE_DOCS) => return Ok(NO_MORE_DOCS),
            Some(doc) => u64::from(doc) + 1,
        };
        Ok(self.scan_from(from))
    }

    fn advance(&mut self, target: DocId) -> CoreResult<DocId> {
        if self.doc == Some(NO_MORE_DOCS) {
            return Ok(NO_MORE_DOCS);
        }
        Ok(self.scan_from(u64::from(target)))
    }

    fn cost(&self) -> u64 {
        u64::from(self.bits.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_for_lengths() {
        assert_eq!(bits_to_words(0), 0);
        assert_eq!(bits_to_words(1), 1);
        assert_eq!(bits_to_words(64), 1);
        assert_eq!(bits_to_words(65), 2);
        assert_eq!(bits_to_words(u32::MAX), 67_108_864);
    }

    #[test]
    fn full_clears_ghost_bits() {
        let set = FixedBitSet::full(70);
        assert_eq!(set.cardinality(), 70);
        assert_eq!(set.words()[1], (1u64 << 6) - 1);
    }

    #[test]
    fn from_words_validates() {
        assert!(FixedBitSet::from_words(vec![0; 2], 70).is_ok());
        assert!(FixedBitSet::from_words(vec![0; 1], 70).is_err());
        assert!(FixedBitSet::from_words(vec![0, 1 << 7], 70).is_err());
    }

    #[test]
    fn set_clear_get() {
        let mut set = FixedBitSet::new(130);
        set.set(0);
        set.set(64);
        set.set(129);
        set.clear(64);

        assert!(set.get(0));
        assert!(!set.get(64));
        assert!(set.get(129));
        assert_eq!(set.cardinality(), 2);
        assert_eq!(set.iter_ones().collect::<Vec<_>>(), vec![0, 129]);
    }

    #[test]
    fn next_set_bit_crosses_words() {
        let mut set = FixedBitSet::new(200);
        set.set(150);
        assert_eq!(set.next_set_bit(0), Some(150));
        assert_eq!(set.next_set_bit(150), Some(150));
        assert_eq!(set.next_set_bit(151), None);
        assert_eq!(set.next_set_bit(500), None);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn get_out_of_bounds_panics() {
        FixedBitSet::new(3).get(3);
    }

    #[test]
    fn predicate_matches_bitset_cardinality() {
        let mut set = FixedBitSet::new(10);
        set.set(7);
        let shared = Arc::new(set);
        let view = {
            let shared = Arc::clone(&shared);
            PredicateBits::new(10, move |i| shared.get(i))
        };

        assert!(view.as_fixed_bitset().is_none());
        assert_eq!(cardinality(&view), 1);
        assert_eq!(cardinality(&*shared), 1);
    }

    #[test]
    fn live_docs_iterator_over_both_views() {
        let mut set = FixedBitSet::new(100);
        for doc in [3, 64, 99] {
            set.set(doc);
        }
        let predicate = PredicateBits::new(100, |i| i == 3 || i == 64 || i == 99);

        let views: [Arc<dyn Bits>; 2] = [Arc::new(set), Arc::new(predicate)];
        for bits in views {
            let mut it = LiveDocsIterator::new(bits);
            assert_eq!(it.doc_id(), None);
            assert_eq!(it.next_doc().unwrap(), 3);
            assert_eq!(it.advance(10).unwrap(), 64);
            assert_eq!(it.next_doc().unwrap(), 99);
            assert_eq!(it.next_doc().unwrap(), NO_MORE_DOCS);
            assert_eq!(it.next_doc().unwrap(), NO_MORE_DOCS);
        }
    }

    #[test]
    fn match_all_bits() {
        let bits = MatchAllBits::new(4);
        assert_eq!(cardinality(&bits), 4);
        assert!(!bits.is_empty());
    }
}
