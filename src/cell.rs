//! A single tsz value cell: the metric fields that identify it within a metric, its current
//! value, and its creation/last-update timestamps.
//!
//! Not thread-safe on its own; callers (`Metric`) serialize access with their own mutex.

use std::time::SystemTime;

use crate::bucketer::BucketerRef;
use crate::field::{FieldMap, FieldMapView};
use crate::value::Value;

/// A cell's metric fields are immutable and pre-hashed by the caller (the hash is the same one
/// used to place the cell in its owning metric's cell set), so `Cell` never recomputes it.
#[derive(Debug, Clone)]
pub struct Cell {
    metric_fields: FieldMap,
    hash: u64,
    value: Value,
    start_time: SystemTime,
    last_update_time: SystemTime,
}

impl Cell {
    /// `hash` must be the hash of `metric_fields` as produced by `FieldMap::cached_hash` (or an
    /// equivalent `FieldMapView`); it's taken as a parameter because this constructor runs on
    /// the hot write path and can't afford to hash the fields again.
    pub fn new(metric_fields: FieldMap, hash: u64, value: Value, now: SystemTime) -> Self {
        Self { metric_fields, hash, value, start_time: now, last_update_time: now }
    }

    pub fn new_distribution(
        metric_fields: FieldMap,
        hash: u64,
        bucketer: Option<BucketerRef>,
        now: SystemTime,
    ) -> Self {
        let bucketer = bucketer.unwrap_or_default();
        Self::new(
            metric_fields,
            hash,
            Value::from(crate::distribution::Distribution::new(bucketer)),
            now,
        )
    }

    pub fn metric_fields(&self) -> &FieldMap {
        &self.metric_fields
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn last_update_time(&self) -> SystemTime {
        self.last_update_time
    }

    pub fn set_value(&mut self, value: Value, now: SystemTime) {
        self.value = value;
        self.last_update_time = now;
    }

    pub fn add_to_int(&mut self, delta: i64, now: SystemTime) {
        if let Value::Int(v) = &mut self.value {
            *v += delta;
        }
        self.last_update_time = now;
    }

    pub fn add_to_distribution(&mut self, sample: f64, times: usize, now: SystemTime) {
        if let Value::Dist(dist) = &mut self.value {
            dist.record_many(sample, times);
        }
        self.last_update_time = now;
    }

    /// Resets the cell to its zero value, restamping both timestamps to `new_start_time`. Used
    /// when a cumulative metric's cell needs to start counting over, e.g. after the process
    /// restarts and the entity's default labels change.
    pub fn reset(&mut self, new_start_time: SystemTime) {
        self.value.reset();
        self.start_time = new_start_time;
        self.last_update_time = new_start_time;
    }

    /// Transparent lookup key for a cell set: short-circuits on the cached hash before ever
    /// comparing the field maps.
    pub fn matches(&self, fields: &FieldMapView<'_>) -> bool {
        self.hash == fields.cached_hash() && &self.metric_fields == fields.value()
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.metric_fields == other.metric_fields
    }
}

impl Eq for Cell {}

impl std::hash::Hash for Cell {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}
