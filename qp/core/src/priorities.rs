//! Priorities and the priority ready-set

use core::fmt;
use crate::{QError, QResult};

/// Number of priority levels available to active objects and threads.
///
/// This is the width of [`PrioritySet`]. Enable the `wide-priorities`
/// feature to go from 64 to 128 levels.
#[cfg(not(feature = "wide-priorities"))]
pub const MAX_ACTIVE: usize = 64;
#[cfg(feature = "wide-priorities")]
pub const MAX_ACTIVE: usize = 128;

const WORD_BITS: usize = 32;
const SET_WORDS: usize = (MAX_ACTIVE + WORD_BITS - 1) / WORD_BITS;

/// `LOG2_LUT[b]` is the 1-based position of the highest set bit of `b`.
const LOG2_LUT: [u8; 256] = build_log2_lut();

const fn build_log2_lut() -> [u8; 256] {
    let mut lut = [0u8; 256];
    let mut i = 1;
    while i < 256 {
        let mut n = 0u8;
        let mut v = i;
        while v != 0 {
            n += 1;
            v >>= 1;
        }
        lut[i] = n;
        i += 1;
    }
    lut
}

#[inline]
fn log2_word(word: u32) -> u8 {
    let mut shift = 24;
    loop {
        let byte = ((word >> shift) & 0xFF) as usize;
        if byte != 0 {
            return LOG2_LUT[byte] + shift as u8;
        }
        if shift == 0 {
            return 0;
        }
        shift -= 8;
    }
}

/// Priority level of an active object or extended thread.
///
/// Higher numbers run first. Priority 0 is the idle level and never
/// identifies a runnable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Idle level
    pub const IDLE: Priority = Priority(0);

    /// Lowest runnable priority
    pub const MIN: Priority = Priority(1);

    /// Highest runnable priority
    pub const MAX: Priority = Priority(MAX_ACTIVE as u8);

    /// Create a validated priority
    pub fn new(priority: u8) -> QResult<Self> {
        if priority == 0 || priority as usize > MAX_ACTIVE {
            Err(QError::InvalidPriority(priority))
        } else {
            Ok(Priority(priority))
        }
    }

    /// Create priority without validation (const fn)
    pub const fn new_unchecked(priority: u8) -> Self {
        Priority(priority)
    }

    /// Get the raw priority value
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Check if this priority can be assigned to a runnable entity
    pub const fn is_valid(self) -> bool {
        self.0 > 0 && self.0 as usize <= MAX_ACTIVE
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Priority {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Priority({})", self.0);
    }
}

/// Macro to create compile-time priority constants
#[macro_export]
macro_rules! priority {
    ($value:literal) => {
        $crate::Priority::new_unchecked($value)
    };
}

/// Set of priorities, one bit per level.
///
/// Used as the scheduler's ready-set and as the subscriber list of a
/// signal. [`find_max`](Self::find_max) resolves the highest member in
/// constant time with a byte-wide log2 lookup table.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct PrioritySet {
    words: [u32; SET_WORDS],
}

impl PrioritySet {
    /// Empty set
    pub const EMPTY: Self = Self { words: [0; SET_WORDS] };

    pub const fn new() -> Self {
        Self::EMPTY
    }

    #[inline]
    fn slot(priority: Priority) -> (usize, u32) {
        crate::q_require!(100, priority.is_valid());
        let n = priority.index() - 1;
        (n / WORD_BITS, 1u32 << (n % WORD_BITS))
    }

    pub fn insert(&mut self, priority: Priority) {
        let (word, mask) = Self::slot(priority);
        self.words[word] |= mask;
    }

    pub fn remove(&mut self, priority: Priority) {
        let (word, mask) = Self::slot(priority);
        self.words[word] &= !mask;
    }

    pub fn contains(&self, priority: Priority) -> bool {
        let (word, mask) = Self::slot(priority);
        self.words[word] & mask != 0
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn has_any(&self) -> bool {
        !self.is_empty()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn clear(&mut self) {
        self.words = [0; SET_WORDS];
    }

    /// Highest priority in the set
    pub fn find_max(&self) -> Option<Priority> {
        for (i, word) in self.words.iter().enumerate().rev() {
            if *word != 0 {
                let bit = log2_word(*word) as usize;
                return Some(Priority((i * WORD_BITS + bit) as u8));
            }
        }
        None
    }

    /// Members from the highest priority down
    pub fn iter_descending(&self) -> impl Iterator<Item = Priority> {
        let mut rest = *self;
        core::iter::from_fn(move || {
            let p = rest.find_max()?;
            rest.remove(p);
            Some(p)
        })
    }
}

impl fmt::Debug for PrioritySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.iter_descending().map(Priority::raw))
            .finish()
    }
}

impl FromIterator<Priority> for PrioritySet {
    fn from_iter<I: IntoIterator<Item = Priority>>(iter: I) -> Self {
        let mut set = Self::new();
        for p in iter {
            set.insert(p);
        }
        set
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PrioritySet {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "PrioritySet({=[u32]})", &self.words[..]);
    }
}
