//! Hash settings for the SH edge table.
//!
//! Two collision-resolution schemes are supported. *Cuckoo* splits the
//! table into `k` disjoint prime-sized partitions, one universal hash
//! function per partition; an edge lives in exactly one of its `k`
//! candidate slots. *Double hashing* uses a single prime-sized table with a
//! secondary step derived from the key.
//!
//! Keys are the 64-bit composite `source_node XOR (letter << 32)`; letters
//! are never stored in the table, the key is recomputed from the window
//! whenever a slot has to be compared (head position plus depth is the
//! sole source of truth for edge letters).

use std::fmt;

use rand::Rng;

use crate::primes::next_prime;

/// The largest 32-bit prime, modulus of the universal hash family.
pub const UNIVERSAL_PRIME: u64 = 4_294_967_291;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Cuckoo,
    Double,
}

#[derive(Debug)]
pub enum HashError {
    ZeroCapacity,
    /// Cuckoo needs at least two hash functions.
    TooFewFunctions { requested: u32 },
    /// A cuckoo displacement chain exhausted its budget with rehashing
    /// disallowed, or rehashing itself failed repeatedly.
    TableFull,
    /// Rehashing did not converge within the attempt budget.
    RehashFailed { attempts: u32 },
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashError::ZeroCapacity => write!(f, "hash table capacity must be positive"),
            HashError::TooFewFunctions { requested } => {
                write!(f, "cuckoo hashing needs at least 2 functions, got {}", requested)
            }
            HashError::TableFull => write!(f, "edge table is full and may not be rehashed"),
            HashError::RehashFailed { attempts } => {
                write!(f, "edge table rehash failed after {} attempts", attempts)
            }
        }
    }
}

impl std::error::Error for HashError {}

/// One member of the universal family `h(x) = ((a·x + b) mod P) mod size`,
/// shifted into its partition.
#[derive(Debug, Clone, Copy)]
pub struct CuckooFn {
    a: u64,
    b: u64,
    size: u64,
    offset: u64,
}

impl CuckooFn {
    pub fn index(&self, key: u64) -> usize {
        let mixed = ((self.a as u128 * key as u128 + self.b as u128)
            % UNIVERSAL_PRIME as u128) as u64;
        (mixed % self.size + self.offset) as usize
    }
}

/// Composite key of an edge record.
pub fn edge_key(source: u32, letter: u32) -> u64 {
    source as u64 ^ ((letter as u64) << 32)
}

#[derive(Debug, Clone)]
pub enum HashSettings {
    Cuckoo { functions: Vec<CuckooFn>, table_size: usize },
    Double { table_size: usize },
}

impl HashSettings {
    /// Build settings for at least `capacity` records.
    pub fn new<R: Rng>(
        resolution: Resolution,
        capacity: usize,
        functions: u32,
        rng: &mut R,
    ) -> Result<Self, HashError> {
        if capacity == 0 {
            return Err(HashError::ZeroCapacity);
        }
        match resolution {
            Resolution::Double => Ok(HashSettings::Double {
                // The secondary step divides by table_size - 2, so the
                // table is never smaller than 5.
                table_size: next_prime((capacity as u64).max(5)) as usize,
            }),
            Resolution::Cuckoo => {
                if functions < 2 {
                    return Err(HashError::TooFewFunctions { requested: functions });
                }
                let k = functions as u64;
                let mut fns = Vec::with_capacity(functions as usize);
                let mut size = next_prime((capacity as u64).div_ceil(k));
                let mut offset = 0u64;
                for _ in 0..functions {
                    fns.push(CuckooFn {
                        a: rng.gen_range(1..UNIVERSAL_PRIME),
                        b: rng.gen_range(0..UNIVERSAL_PRIME),
                        size,
                        offset,
                    });
                    offset += size;
                    // strictly growing partition sizes keep them distinct
                    size = next_prime(size + 1);
                }
                Ok(HashSettings::Cuckoo {
                    functions: fns,
                    table_size: offset as usize,
                })
            }
        }
    }

    pub fn resolution(&self) -> Resolution {
        match self {
            HashSettings::Cuckoo { .. } => Resolution::Cuckoo,
            HashSettings::Double { .. } => Resolution::Double,
        }
    }

    pub fn table_size(&self) -> usize {
        match self {
            HashSettings::Cuckoo { table_size, .. } => *table_size,
            HashSettings::Double { table_size } => *table_size,
        }
    }

    pub fn function_count(&self) -> u32 {
        match self {
            HashSettings::Cuckoo { functions, .. } => functions.len() as u32,
            HashSettings::Double { .. } => 2,
        }
    }

    /// Candidate slot of `key` under cuckoo function `i`.
    pub fn cuckoo_index(&self, i: usize, key: u64) -> usize {
        match self {
            HashSettings::Cuckoo { functions, .. } => functions[i].index(key),
            HashSettings::Double { .. } => unreachable!("cuckoo probe on double hashing"),
        }
    }

    /// Primary slot under double hashing.
    pub fn primary(&self, key: u64) -> usize {
        let size = self.table_size() as u64;
        (key % size) as usize
    }

    /// Secondary step under double hashing; in `[1, table_size - 2]` and
    /// coprime to the prime table size, so a probe visits every slot.
    pub fn secondary(&self, key: u64) -> usize {
        let size = self.table_size() as u64;
        (key % (size - 2) + 1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primes::is_prime;
    use proptest::prelude::*;
    use rand::thread_rng;

    #[test]
    fn zero_capacity_rejected() {
        let mut rng = thread_rng();
        assert!(matches!(
            HashSettings::new(Resolution::Cuckoo, 0, 8, &mut rng),
            Err(HashError::ZeroCapacity)
        ));
    }

    #[test]
    fn too_few_functions_rejected() {
        let mut rng = thread_rng();
        assert!(matches!(
            HashSettings::new(Resolution::Cuckoo, 100, 1, &mut rng),
            Err(HashError::TooFewFunctions { requested: 1 })
        ));
    }

    #[test]
    fn cuckoo_partitions_are_prime_and_disjoint() {
        let mut rng = thread_rng();
        let settings = HashSettings::new(Resolution::Cuckoo, 1000, 4, &mut rng).unwrap();
        let HashSettings::Cuckoo { functions, table_size } = &settings else {
            panic!("expected cuckoo settings");
        };
        let mut expected_offset = 0u64;
        let mut previous = 0u64;
        for f in functions {
            assert!(is_prime(f.size));
            assert!(f.size > previous);
            assert_eq!(f.offset, expected_offset);
            expected_offset += f.size;
            previous = f.size;
        }
        assert_eq!(*table_size, expected_offset as usize);
        assert!(*table_size >= 1000);
    }

    #[test]
    fn double_table_is_prime() {
        let mut rng = thread_rng();
        let settings = HashSettings::new(Resolution::Double, 100, 0, &mut rng).unwrap();
        assert!(is_prime(settings.table_size() as u64));
        assert!(settings.table_size() >= 100);
    }

    proptest! {
        #[test]
        fn cuckoo_indices_stay_in_partition(key in any::<u64>()) {
            let mut rng = thread_rng();
            let settings = HashSettings::new(Resolution::Cuckoo, 500, 3, &mut rng).unwrap();
            let HashSettings::Cuckoo { functions, table_size } = &settings else {
                unreachable!()
            };
            for (i, f) in functions.iter().enumerate() {
                let idx = settings.cuckoo_index(i, key);
                prop_assert!(idx >= f.offset as usize);
                prop_assert!(idx < (f.offset + f.size) as usize);
                prop_assert!(idx < *table_size);
            }
        }

        #[test]
        fn double_probe_covers_table(key in any::<u64>()) {
            let mut rng = thread_rng();
            let settings = HashSettings::new(Resolution::Double, 20, 0, &mut rng).unwrap();
            let size = settings.table_size();
            let step = settings.secondary(key);
            prop_assert!(step >= 1 && step <= size - 2);
            let mut seen = vec![false; size];
            let mut idx = settings.primary(key);
            for _ in 0..size {
                prop_assert!(!seen[idx]);
                seen[idx] = true;
                idx = (idx + step) % size;
            }
            prop_assert!(seen.iter().all(|&s| s));
        }
    }
}
