use crate::bucketer::{Bucketer, BucketerRef};
use crate::error::{Result, TszError};

/// A histogram value: sample count, running sum, and per-bucket counts against a referenced
/// bucketer.
///
/// The running mean and sum of squared deviations are tracked with Welford's provisional-means
/// method so `variance`/`stddev` stay numerically stable over long-running accumulation; the
/// publicly reported `mean` is still `sum / count`, matching how every other read accessor is
/// defined directly in terms of `sum` and `count`.
#[derive(Debug, Clone)]
pub struct Distribution {
    bucketer: BucketerRef,
    buckets: Vec<usize>,
    underflow: usize,
    overflow: usize,
    count: usize,
    sum: f64,
    running_mean: f64,
    sum_of_squared_deviations: f64,
}

impl Distribution {
    pub fn new(bucketer: BucketerRef) -> Self {
        let buckets = vec![0; bucketer.num_finite_buckets()];
        Self {
            bucketer,
            buckets,
            underflow: 0,
            overflow: 0,
            count: 0,
            sum: 0.0,
            running_mean: 0.0,
            sum_of_squared_deviations: 0.0,
        }
    }

    pub fn bucketer(&self) -> &'static Bucketer {
        self.bucketer.bucketer
    }

    pub fn num_finite_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket(&self, i: usize) -> usize {
        self.buckets[i]
    }

    pub fn underflow(&self) -> usize {
        self.underflow
    }

    pub fn overflow(&self) -> usize {
        self.overflow
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.sum / self.count as f64 }
    }

    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_of_squared_deviations / self.count as f64
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Places `times` occurrences of `sample` into the bucket matching `bucket_index`.
    ///
    /// WARNING: `bucket_index` must have been produced by `self.bucketer().get_bucket_for(sample)`
    /// or the per-bucket counts will no longer correspond to the samples they claim to cover.
    pub fn record_to_bucket(&mut self, bucket_index: isize, times: usize) {
        if bucket_index < 0 {
            self.underflow += times;
        } else if (bucket_index as usize) >= self.buckets.len() {
            self.overflow += times;
        } else {
            self.buckets[bucket_index as usize] += times;
        }
    }

    pub fn record(&mut self, sample: f64) {
        self.record_many(sample, 1);
    }

    pub fn record_many(&mut self, sample: f64, times: usize) {
        if times == 0 {
            return;
        }
        let bucket = self.bucketer.get_bucket_for(sample);
        self.record_to_bucket(bucket, times);
        self.sum += sample * times as f64;
        for _ in 0..times {
            self.count += 1;
            let delta = sample - self.running_mean;
            self.running_mean += delta / self.count as f64;
            let delta2 = sample - self.running_mean;
            self.sum_of_squared_deviations += delta * delta2;
        }
    }

    /// Merges `other` into `self`. Both distributions must share the same bucketer.
    pub fn add(&mut self, other: &Distribution) -> Result<()> {
        if self.bucketer != other.bucketer {
            return Err(TszError::InvalidArgument(
                "cannot merge distributions with different bucketers".to_string(),
            ));
        }
        let n1 = self.count as f64;
        let n2 = other.count as f64;
        let n = n1 + n2;
        if n > 0.0 {
            let delta = other.running_mean - self.running_mean;
            self.running_mean += delta * n2 / n;
            self.sum_of_squared_deviations += other.sum_of_squared_deviations
                + delta * delta * n1 * n2 / n;
        }
        self.count += other.count;
        self.sum += other.sum;
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *mine += theirs;
        }
        Ok(())
    }

    /// Zeros sum, count, and all bucket counts but retains the bucketer reference.
    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(|b| *b = 0);
        self.underflow = 0;
        self.overflow = 0;
        self.count = 0;
        self.sum = 0.0;
        self.running_mean = 0.0;
        self.sum_of_squared_deviations = 0.0;
    }
}

impl Default for Distribution {
    fn default() -> Self {
        Self::new(BucketerRef::default())
    }
}

impl PartialEq for Distribution {
    fn eq(&self, other: &Self) -> bool {
        self.bucketer == other.bucketer
            && self.buckets == other.buckets
            && self.underflow == other.underflow
            && self.overflow == other.overflow
    }
}

impl Eq for Distribution {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_distribution() {
        let dist = Distribution::new(BucketerRef::from(Bucketer::powers_of(2.0, 4)));
        assert!(dist.is_empty());
        assert_eq!(dist.count(), 0);
        assert_eq!(dist.mean(), 0.0);
    }

    #[test]
    fn test_record_single_samples() {
        let mut dist = Distribution::new(BucketerRef::from(Bucketer::powers_of(2.0, 4)));
        dist.record(1.0);
        dist.record(1.0);
        dist.record(3.0);
        assert_eq!(dist.count(), 3);
        assert_eq!(dist.sum(), 5.0);
        assert_eq!(dist.bucket(0), 2);
        assert_eq!(dist.bucket(1), 1);
    }

    #[test]
    fn test_record_many() {
        let mut dist = Distribution::new(BucketerRef::from(Bucketer::powers_of(2.0, 4)));
        dist.record_many(1.0, 5);
        assert_eq!(dist.count(), 5);
        assert_eq!(dist.sum(), 5.0);
        assert_eq!(dist.bucket(0), 5);
    }

    #[test]
    fn test_record_many_zero_is_noop() {
        let mut dist = Distribution::new(BucketerRef::from(Bucketer::powers_of(2.0, 4)));
        dist.record_many(1.0, 0);
        assert!(dist.is_empty());
    }

    #[test]
    fn test_underflow_and_overflow() {
        let mut dist = Distribution::new(BucketerRef::from(Bucketer::powers_of(2.0, 2)));
        dist.record(0.1);
        dist.record(1000.0);
        assert_eq!(dist.underflow(), 1);
        assert_eq!(dist.overflow(), 1);
        assert_eq!(dist.count(), 2);
    }

    #[test]
    fn test_clear_retains_bucketer() {
        let bucketer = BucketerRef::from(Bucketer::powers_of(2.0, 4));
        let mut dist = Distribution::new(bucketer);
        dist.record(1.0);
        dist.clear();
        assert!(dist.is_empty());
        assert_eq!(dist.bucketer, bucketer);
    }

    #[test]
    fn test_add_merges_counts() {
        let bucketer = BucketerRef::from(Bucketer::powers_of(2.0, 4));
        let mut dist1 = Distribution::new(bucketer);
        dist1.record(1.0);
        let mut dist2 = Distribution::new(bucketer);
        dist2.record(3.0);
        dist2.record(3.0);
        dist1.add(&dist2).unwrap();
        assert_eq!(dist1.count(), 3);
        assert_eq!(dist1.sum(), 7.0);
        assert_eq!(dist1.bucket(0), 1);
        assert_eq!(dist1.bucket(1), 2);
    }

    #[test]
    fn test_add_rejects_mismatched_bucketer() {
        let mut dist1 = Distribution::new(BucketerRef::from(Bucketer::powers_of(2.0, 4)));
        let dist2 = Distribution::new(BucketerRef::from(Bucketer::powers_of(3.0, 4)));
        assert!(dist1.add(&dist2).is_err());
    }

    #[test]
    fn test_variance_of_constant_samples_is_zero() {
        let mut dist = Distribution::new(BucketerRef::from(Bucketer::powers_of(2.0, 4)));
        dist.record_many(4.0, 10);
        assert_eq!(dist.variance(), 0.0);
    }
}
