//! Priority bitmap management for O(1) highest-ready lookup
//!
//! Bit `p % 32` of word `p / 32` is set while at least one task is ready at
//! priority `p`. Higher numbers are more urgent, so the highest ready
//! priority is found with a leading-zero count on the top non-empty word.

use crate::config::CFG_PRIO_MAX;
use crate::types::OsPrio;

/// Number of words needed for the priority bitmap
const PRIO_TBL_SIZE: usize = (CFG_PRIO_MAX + 31) / 32;

/// Priority bitmap table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrioTable {
    bitmap: [u32; PRIO_TBL_SIZE],
}

impl PrioTable {
    pub const fn new() -> Self {
        PrioTable {
            bitmap: [0; PRIO_TBL_SIZE],
        }
    }

    /// Mark a priority as having ready tasks
    #[inline]
    pub fn insert(&mut self, prio: OsPrio) {
        debug_assert!((prio as usize) < CFG_PRIO_MAX);
        let (word_idx, bit) = Self::locate(prio);
        self.bitmap[word_idx] |= bit;
    }

    /// Clear a priority
    #[inline]
    pub fn remove(&mut self, prio: OsPrio) {
        debug_assert!((prio as usize) < CFG_PRIO_MAX);
        let (word_idx, bit) = Self::locate(prio);
        self.bitmap[word_idx] &= !bit;
    }

    /// Highest priority with a set bit, `None` when the table is empty
    #[inline]
    pub fn get_highest(&self) -> Option<OsPrio> {
        for (word_idx, &word) in self.bitmap.iter().enumerate().rev() {
            if word != 0 {
                let bit = 31 - word.leading_zeros() as usize;
                return Some((word_idx * 32 + bit) as OsPrio);
            }
        }
        None
    }

    /// Check if a specific priority has any ready tasks
    #[inline]
    pub fn is_set(&self, prio: OsPrio) -> bool {
        let (word_idx, bit) = Self::locate(prio);
        (self.bitmap[word_idx] & bit) != 0
    }

    /// Check if the priority table is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bitmap.iter().all(|&w| w == 0)
    }

    #[inline]
    fn locate(prio: OsPrio) -> (usize, u32) {
        let prio = prio as usize;
        (prio / 32, 1 << (prio % 32))
    }
}

impl Default for PrioTable {
    fn default() -> Self {
        Self::new()
    }
}
