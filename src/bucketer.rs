use crate::utils::f64::F64;
use std::collections::BTreeSet;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::{LazyLock, Mutex};

/// An immutable histogram bucketing scheme.
///
/// `boundaries` holds `n + 1` ascending edges defining `n` finite buckets: bucket `i` covers
/// `[boundaries[i], boundaries[i + 1])`. A sample below `boundaries[0]` falls in the underflow
/// bucket; a sample at or above the last boundary falls in the overflow bucket.
///
/// Bucketers are interned: two bucketers with the same boundary sequence are always the same
/// object, so `==` can use pointer identity.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Bucketer {
    boundaries: Vec<F64>,
}

impl Bucketer {
    fn intern(boundaries: Vec<F64>) -> &'static Self {
        static BUCKETERS: LazyLock<Mutex<BTreeSet<Pin<Box<Bucketer>>>>> =
            LazyLock::new(|| Mutex::new(BTreeSet::new()));
        let candidate = Bucketer { boundaries };
        let mut bucketers = BUCKETERS.lock().unwrap();
        if let Some(existing) = bucketers.get(&candidate) {
            // Safety: entries are never removed from `BUCKETERS` and are heap-boxed and pinned, so
            // their address is stable for the process's lifetime.
            return unsafe { std::mem::transmute::<&Bucketer, &'static Bucketer>(existing) };
        }
        let boxed = Box::pin(candidate);
        let ptr: &Bucketer = &boxed;
        // Safety: same justification as above; `boxed` is moved into `bucketers` right after and
        // never removed.
        let ptr = unsafe { std::mem::transmute::<&Bucketer, &'static Bucketer>(ptr) };
        bucketers.insert(boxed);
        ptr
    }

    /// A bucketer with `num_finite_buckets` buckets of constant width, starting at `offset`.
    pub fn fixed_width(offset: f64, width: f64, num_finite_buckets: usize) -> &'static Self {
        assert!(width > 0.0);
        let boundaries = (0..=num_finite_buckets)
            .map(|i| F64::from(offset + width * i as f64))
            .collect();
        Self::intern(boundaries)
    }

    /// A bucketer whose bucket `i` covers `[base^i, base^(i+1))`.
    pub fn powers_of(base: f64, num_finite_buckets: usize) -> &'static Self {
        assert!(base > 1.0);
        let boundaries = (0..=num_finite_buckets)
            .map(|i| F64::from(base.powi(i as i32)))
            .collect();
        Self::intern(boundaries)
    }

    /// A bucketer whose bucket `i` covers `[scale * base^i, scale * base^(i+1))`.
    pub fn scaled_powers_of(scale: f64, base: f64, num_finite_buckets: usize) -> &'static Self {
        assert!(scale > 0.0);
        assert!(base > 1.0);
        let boundaries = (0..=num_finite_buckets)
            .map(|i| F64::from(scale * base.powi(i as i32)))
            .collect();
        Self::intern(boundaries)
    }

    /// A bucketer with an explicit, caller-supplied set of ascending boundaries.
    pub fn custom(boundaries: Vec<f64>) -> &'static Self {
        assert!(boundaries.len() >= 2, "a bucketer needs at least one finite bucket");
        let boundaries: Vec<F64> = boundaries.into_iter().map(F64::from).collect();
        for pair in boundaries.windows(2) {
            assert!(pair[0] < pair[1], "bucketer boundaries must be strictly ascending");
        }
        Self::intern(boundaries)
    }

    /// The process-wide default bucketer, used when a distribution metric is declared without an
    /// explicit one.
    pub fn default_bucketer() -> &'static Self {
        static DEFAULT: LazyLock<&'static Bucketer> =
            LazyLock::new(|| Bucketer::scaled_powers_of(1.0, 4.0, 20));
        *DEFAULT
    }

    pub fn num_finite_buckets(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn lower_bound(&self, bucket: usize) -> f64 {
        self.boundaries[bucket].value
    }

    pub fn upper_bound(&self, bucket: usize) -> f64 {
        self.boundaries[bucket + 1].value
    }

    /// Places `sample` into a bucket index. Negative results mean underflow; results equal to or
    /// greater than `num_finite_buckets()` mean overflow.
    pub fn get_bucket_for(&self, sample: f64) -> isize {
        if sample < self.boundaries[0].value {
            return -1;
        }
        let n = self.num_finite_buckets();
        if sample >= self.boundaries[n].value {
            return n as isize;
        }
        // Binary search for the finite bucket whose [lower, upper) range contains `sample`.
        let (mut lo, mut hi) = (0usize, n);
        while lo + 1 < hi {
            let mid = lo + (hi - lo) / 2;
            if self.boundaries[mid].value <= sample {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo as isize
    }
}

/// A pointer-comparable reference to an interned `Bucketer`.
#[derive(Debug, Clone, Copy)]
pub struct BucketerRef {
    pub bucketer: &'static Bucketer,
}

impl From<&'static Bucketer> for BucketerRef {
    fn from(bucketer: &'static Bucketer) -> Self {
        Self { bucketer }
    }
}

impl Default for BucketerRef {
    fn default() -> Self {
        Self {
            bucketer: Bucketer::default_bucketer(),
        }
    }
}

impl PartialEq for BucketerRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.bucketer, other.bucketer)
    }
}

impl Eq for BucketerRef {}

impl Deref for BucketerRef {
    type Target = Bucketer;

    fn deref(&self) -> &Self::Target {
        self.bucketer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_buckets() {
        let b = Bucketer::fixed_width(0.0, 10.0, 3);
        assert_eq!(b.num_finite_buckets(), 3);
        assert_eq!(b.lower_bound(0), 0.0);
        assert_eq!(b.upper_bound(0), 10.0);
        assert_eq!(b.get_bucket_for(-1.0), -1);
        assert_eq!(b.get_bucket_for(5.0), 0);
        assert_eq!(b.get_bucket_for(15.0), 1);
        assert_eq!(b.get_bucket_for(35.0), 3);
    }

    #[test]
    fn test_powers_of_buckets() {
        let b = Bucketer::powers_of(2.0, 4);
        assert_eq!(b.get_bucket_for(1.0), 0);
        assert_eq!(b.get_bucket_for(3.0), 1);
        assert_eq!(b.get_bucket_for(4.0), 2);
        assert_eq!(b.get_bucket_for(0.5), -1);
        assert_eq!(b.get_bucket_for(100.0), 4);
    }

    #[test]
    fn test_interning_is_pointer_stable() {
        let b1 = Bucketer::powers_of(2.0, 4);
        let b2 = Bucketer::powers_of(2.0, 4);
        assert!(std::ptr::eq(b1, b2));
    }

    #[test]
    fn test_distinct_params_are_distinct_objects() {
        let b1 = Bucketer::powers_of(2.0, 4);
        let b2 = Bucketer::powers_of(3.0, 4);
        assert!(!std::ptr::eq(b1, b2));
    }

    #[test]
    fn test_bucketer_ref_equality_is_pointer_identity() {
        let r1 = BucketerRef::from(Bucketer::powers_of(5.0, 2));
        let r2 = BucketerRef::from(Bucketer::powers_of(5.0, 2));
        assert_eq!(r1, r2);
    }

    #[test]
    fn test_default_bucketer_is_stable() {
        assert!(std::ptr::eq(
            BucketerRef::default().bucketer,
            BucketerRef::default().bucketer
        ));
    }
}
