pub mod f64;
pub mod lazy;
pub mod rate_limiter;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Hashes an arbitrary `Hash` value with the process's default hasher. Used to pre-compute the
/// hash carried alongside a name or label set so lookups never have to hash the same data twice.
pub fn hash_value<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

pub fn hash_str(s: &str) -> u64 {
    hash_value(s)
}
