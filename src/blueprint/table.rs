//! Two-hash cuckoo-style perfect hash table used to select a blueprint.
//!
//! Spec.md §4.1: "`select(kind, meta_tuple) → Blueprint` is O(1) expected
//! time via a two-hash cuckoo-style lookup over a precomputed table: two
//! independent hashes h1(key), h2(key) map to slot indices; at one of the
//! two slots, a 32-bit fingerprint equal to the other hash is stored,
//! confirming membership. A sentinel fingerprint indicates empty."
//!
//! Construction happens once, offline from this crate's point of view (the
//! real system's offline builder enumerates `cond<meta...>()` and emits this
//! table; here [`BlueprintTable::build`] plays that role for whatever
//! registers a blueprint set, including the test fixtures).

use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

const SALT_1: u64 = 0x9E3779B97F4A7C15;
const SALT_2: u64 = 0xC2B2AE3D27D4EB4F;
const MAX_SEED_ATTEMPTS: u32 = 128;
const MAX_KICKS: u32 = 512;

fn hash_with_salt<K: Hash>(salt: u64, key: &K) -> u64 {
    let mut hasher = FxHasher::default();
    salt.hash(&mut hasher);
    key.hash(&mut hasher);
    hasher.finish()
}

#[derive(Clone)]
struct Occupant<K, V> {
    key: K,
    fingerprint: u32,
    value: V,
}

#[derive(Clone)]
enum Slot<K, V> {
    Empty,
    Filled(Occupant<K, V>),
}

/// A collision-free lookup table from keys to values, built once and read
/// many times without locking (the boilerplate library is process-global
/// and read-only after initialization, spec.md §5).
pub struct BlueprintTable<K, V> {
    slots: Vec<Slot<K, V>>,
    seed1: u64,
    seed2: u64,
}

impl<K, V> BlueprintTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Build a perfect hash table over `entries`. Panics if no seed pair
    /// produces a collision-free layout within the retry budget — per
    /// spec.md §4.1 this table is supposed to be collision-free *by
    /// construction*, so exhausting the budget indicates the entry set (or
    /// its key's `Hash` impl) is pathological, not a runtime condition a
    /// caller can recover from.
    pub fn build(entries: Vec<(K, V)>) -> Self {
        if entries.is_empty() {
            return BlueprintTable {
                slots: Vec::new(),
                seed1: SALT_1,
                seed2: SALT_2,
            };
        }

        let size = (entries.len() * 4).next_power_of_two().max(8);

        for attempt in 0..MAX_SEED_ATTEMPTS {
            let seed1 = SALT_1.wrapping_mul(2 * attempt as u64 + 1);
            let seed2 = SALT_2.wrapping_add((attempt as u64 + 1).wrapping_mul(0x1000_0001));
            if seed1 == seed2 {
                continue;
            }
            if let Some(slots) = Self::try_build(&entries, size, seed1, seed2) {
                return BlueprintTable { slots, seed1, seed2 };
            }
        }
        panic!(
            "blueprint table construction did not converge after {} seed attempts for {} entries",
            MAX_SEED_ATTEMPTS,
            entries.len()
        );
    }

    /// Slots this key's two candidate positions, given the table's seeds.
    fn candidates(key: &K, size: usize, seed1: u64, seed2: u64) -> (usize, usize) {
        let h1 = (hash_with_salt(seed1, key) as usize) % size;
        let h2 = (hash_with_salt(seed2, key) as usize) % size;
        (h1, h2)
    }

    fn try_build(
        entries: &[(K, V)],
        size: usize,
        seed1: u64,
        seed2: u64,
    ) -> Option<Vec<Slot<K, V>>> {
        let mut slots: Vec<Slot<K, V>> = (0..size).map(|_| Slot::Empty).collect();

        for (key, value) in entries {
            let mut pending = Occupant {
                key: key.clone(),
                fingerprint: 0, // recomputed each placement attempt below
                value: value.clone(),
            };
            let mut prefer_first = true;
            let mut placed = false;

            for _kick in 0..MAX_KICKS {
                let (h1, h2) = Self::candidates(&pending.key, size, seed1, seed2);
                let (slot_idx, fingerprint) = if prefer_first {
                    (h1, h2 as u32)
                } else {
                    (h2, h1 as u32)
                };
                pending.fingerprint = fingerprint;

                match std::mem::replace(&mut slots[slot_idx], Slot::Empty) {
                    Slot::Empty => {
                        slots[slot_idx] = Slot::Filled(pending);
                        placed = true;
                        break;
                    }
                    Slot::Filled(occupant) => {
                        slots[slot_idx] = Slot::Filled(pending);
                        pending = occupant;
                        prefer_first = !prefer_first;
                    }
                }
            }
            // This seed pair couldn't place every entry within the kick
            // budget — bail out to a fresh seed pair rather than dropping
            // the displaced occupant on the floor.
            if !placed {
                return None;
            }
        }

        Some(slots)
    }

    /// Look up `key`. Returns `None` if no matching entry was registered —
    /// spec.md §4.1: selecting an unmaterialized tuple is a programming
    /// error at the composer boundary, but the table itself just reports
    /// absence; the composer decides what to do with that.
    pub fn get(&self, key: &K) -> Option<&V> {
        if self.slots.is_empty() {
            return None;
        }
        let size = self.slots.len();
        let (h1, h2) = Self::candidates(key, size, self.seed1, self.seed2);

        if let Slot::Filled(occupant) = &self.slots[h1] {
            if occupant.fingerprint == h2 as u32 && occupant.key == *key {
                return Some(&occupant.value);
            }
        }
        if let Slot::Filled(occupant) = &self.slots[h2] {
            if occupant.fingerprint == h1 as u32 && occupant.key == *key {
                return Some(&occupant.value);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Filled { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
