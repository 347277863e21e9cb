//! Bitmap-indexed views over a shared backing list of endpoints.
//!
//! Each routing pass derives narrower and narrower subsets of the same
//! endpoint snapshot. `BitList` makes every derivation a bitmap operation
//! over one shared `Arc<Vec<T>>` arena: no endpoint is ever cloned or moved,
//! and two views over the same snapshot can be intersected word-by-word.

use std::sync::Arc;

use tracing::debug;

const WORD_BITS: usize = 64;

// ---------------------------------------------------------------------------
// BitList
// ---------------------------------------------------------------------------

/// A subset view over an immutable backing list.
///
/// Invariants:
/// - bit `i` corresponds to `backing[i]`; the bitmap never addresses past the
///   backing list's length
/// - set operations (`narrow`, `intersect`, `union`) touch only the bitmap,
///   never the backing list
/// - iteration yields elements in backing-list order, so downstream
///   tie-breaks are deterministic
#[derive(Clone)]
pub struct BitList<T> {
    backing: Arc<Vec<T>>,
    words: Vec<u64>,
    len: usize,
}

impl<T> std::fmt::Debug for BitList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitList")
            .field("included", &self.len)
            .field("backing", &self.backing.len())
            .finish()
    }
}

impl<T> BitList<T> {
    /// A view including every element of the backing list.
    #[must_use]
    pub fn full(backing: Arc<Vec<T>>) -> Self {
        let n = backing.len();
        let mut words = vec![u64::MAX; n.div_ceil(WORD_BITS)];
        if let Some(last) = words.last_mut() {
            let tail = n % WORD_BITS;
            if tail != 0 {
                *last = (1u64 << tail) - 1;
            }
        }
        Self {
            backing,
            words,
            len: n,
        }
    }

    /// Convenience constructor taking ownership of the items.
    #[must_use]
    pub fn from_vec(items: Vec<T>) -> Self {
        Self::full(Arc::new(items))
    }

    /// An empty view over the same backing list as `self`.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self {
            backing: Arc::clone(&self.backing),
            words: vec![0; self.words.len()],
            len: 0,
        }
    }

    /// The shared backing list this view indexes into.
    #[must_use]
    pub fn backing(&self) -> &Arc<Vec<T>> {
        &self.backing
    }

    /// Whether two views index the same backing list instance.
    #[must_use]
    pub fn same_backing(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.backing, &other.backing)
    }

    /// Number of included elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether backing index `index` is included in this view.
    #[must_use]
    pub fn contains_index(&self, index: usize) -> bool {
        index < self.backing.len()
            && self.words[index / WORD_BITS] & (1u64 << (index % WORD_BITS)) != 0
    }

    fn clear_index(&mut self, index: usize) {
        let mask = 1u64 << (index % WORD_BITS);
        let word = &mut self.words[index / WORD_BITS];
        if *word & mask != 0 {
            *word &= !mask;
            self.len -= 1;
        }
    }

    /// Keeps only included elements satisfying the predicate.
    pub fn retain(&mut self, mut predicate: impl FnMut(&T) -> bool) {
        for index in 0..self.backing.len() {
            if self.contains_index(index) && !predicate(&self.backing[index]) {
                self.clear_index(index);
            }
        }
    }

    /// Keeps only included indices satisfying the predicate over
    /// `(index, element)`.
    pub fn retain_indexed(&mut self, mut predicate: impl FnMut(usize, &T) -> bool) {
        for index in 0..self.backing.len() {
            if self.contains_index(index) && !predicate(index, &self.backing[index]) {
                self.clear_index(index);
            }
        }
    }

    /// Consuming form of `retain` for builder-style narrowing.
    #[must_use]
    pub fn narrow(mut self, predicate: impl FnMut(&T) -> bool) -> Self {
        self.retain(predicate);
        self
    }

    /// Bitwise AND with another view over the same backing list.
    ///
    /// Views over different backing lists cannot be meaningfully combined;
    /// the result is the empty set and the mismatch is logged.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        if !self.same_backing(other) {
            debug!("bitlist intersect across different backing lists yields the empty set");
            return self.empty_like();
        }
        let words: Vec<u64> = self
            .words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| a & b)
            .collect();
        Self::from_words(Arc::clone(&self.backing), words)
    }

    /// Bitwise OR with another view over the same backing list.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if !self.same_backing(other) {
            debug!("bitlist union across different backing lists yields the empty set");
            return self.empty_like();
        }
        let words: Vec<u64> = self
            .words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| a | b)
            .collect();
        Self::from_words(Arc::clone(&self.backing), words)
    }

    fn from_words(backing: Arc<Vec<T>>, words: Vec<u64>) -> Self {
        let len = words.iter().map(|w| w.count_ones() as usize).sum();
        Self {
            backing,
            words,
            len,
        }
    }

    /// Included elements in backing-list order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.backing.len())
            .filter(|&i| self.contains_index(i))
            .map(|i| &self.backing[i])
    }

    /// Included backing indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.backing.len()).filter(|&i| self.contains_index(i))
    }

    /// The first included element, if any.
    pub fn first(&self) -> Option<&T> {
        self.iter().next()
    }

    /// The element at the given position among included elements
    /// (`position < len()`), in backing-list order.
    pub fn get(&self, position: usize) -> Option<&T> {
        self.iter().nth(position)
    }
}

impl<T: Clone> BitList<T> {
    /// Materializes the included elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
