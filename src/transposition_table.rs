//! A fixed size cache of score bounds, indexed by position key
//!
//! Slots are direct-mapped (`key % capacity`) and always replaced. Only the
//! low 32 bits of a key are stored: since keys fit in `WIDTH * (HEIGHT + 1)`
//! bits and the capacity is an odd prime of at least `2^17`, the slot index
//! and the stored bits together identify a key exactly (chinese remainder
//! theorem), so a hit is never a different position.

use log::debug;

use crate::error::SolverError;
use crate::{HEIGHT, WIDTH};

/// Default number of slots, about 64MB
pub const DEFAULT_CAPACITY: usize = (1 << 23) + 9; // prime value

/// Smallest capacity for which stored key bits still identify positions
pub const MIN_CAPACITY: usize = 1 << (WIDTH * (HEIGHT + 1) - 32);

/// Largest capacity whose slots can be addressed in memory
pub const MAX_CAPACITY: usize = isize::MAX as usize / std::mem::size_of::<Entry>();

/// How a stored value relates to the true score of the position
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Bound {
    /// The value is the score
    Exact,
    /// The score is at least the value
    Lower,
    /// The score is at most the value
    Upper,
}

impl Bound {
    fn encode(self) -> u8 {
        match self {
            Bound::Exact => 1,
            Bound::Lower => 2,
            Bound::Upper => 3,
        }
    }

    fn decode(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Bound::Exact),
            2 => Some(Bound::Lower),
            3 => Some(Bound::Upper),
            _ => None,
        }
    }
}

/// A cached score bound
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TableEntry {
    pub value: i32,
    pub bound: Bound,
}

#[derive(Copy, Clone)]
struct Entry {
    key: u32,
    value: i8,
    // 0 marks an empty slot
    bound: u8,
}
impl Entry {
    pub fn new() -> Self {
        Self {
            key: 0,
            value: 0,
            bound: 0,
        }
    }
}

#[derive(Clone)]
pub struct TranspositionTable {
    entries: Vec<Entry>,
}

impl TranspositionTable {
    /// Allocates a table of [`DEFAULT_CAPACITY`] slots
    ///
    /// # Panics
    /// Aborts if the allocation fails, use [`TranspositionTable::with_capacity`]
    /// to handle that case
    pub fn new() -> Self {
        Self {
            entries: vec![Entry::new(); DEFAULT_CAPACITY],
        }
    }

    /// Allocates a table of at least `slots` slots
    ///
    /// The capacity is rounded up to a prime no smaller than [`MIN_CAPACITY`].
    pub fn with_capacity(slots: usize) -> Result<Self, SolverError> {
        let slots = Some(slots.max(MIN_CAPACITY))
            .filter(|&n| n <= MAX_CAPACITY)
            .and_then(next_prime)
            .filter(|&n| n <= MAX_CAPACITY)
            .ok_or(SolverError::TableSize(slots))?;
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(slots)
            .map_err(|source| SolverError::TableAllocation { slots, source })?;
        entries.resize(slots, Entry::new());
        debug!(
            "allocated transposition table with {} slots ({} bytes)",
            slots,
            slots * std::mem::size_of::<Entry>()
        );
        Ok(Self { entries })
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Stores a bound for `key`, replacing whatever held its slot
    pub fn put(&mut self, key: u64, value: i32, bound: Bound) {
        debug_assert!(value >= i8::MIN as i32 && value <= i8::MAX as i32);
        let len = self.entries.len();
        self.entries[(key % len as u64) as usize] = Entry {
            key: key as u32,
            value: value as i8,
            bound: bound.encode(),
        };
    }

    /// Fetches the bound stored for `key`, if its slot still holds it
    pub fn get(&self, key: u64) -> Option<TableEntry> {
        let entry = self.entries[(key % self.entries.len() as u64) as usize];
        if entry.key != key as u32 {
            return None;
        }
        Bound::decode(entry.bound).map(|bound| TableEntry {
            value: entry.value as i32,
            bound,
        })
    }

    /// Empties every slot
    pub fn reset(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = Entry::new();
        }
    }
}

impl Default for TranspositionTable {
    fn default() -> Self {
        Self::new()
    }
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2;
    while d <= n / d {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}

fn next_prime(mut n: usize) -> Option<usize> {
    while !is_prime(n) {
        n = n.checked_add(1)?;
    }
    Some(n)
}
