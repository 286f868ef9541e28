//! Pin-holding handles ("contexts") that keep an entity or metric alive across a lock-release
//! boundary.
//!
//! The source tree behind this crate models these as RAII guards taken by every writer: a
//! `MetricContext` wraps a pinned metric plus the wall-clock timestamp to stamp into whatever
//! cell the write touches, and an `EntityContext` wraps a pinned entity plus the ability to pin
//! one of its metrics in turn. Two usage patterns share the same underlying type instead of two
//! separate classes as the source has (`ScopedMetricProxy` vs `ThrowAwayMetricProxy`): a caller
//! that holds the context across several writes gets "scoped" behavior for free, and a caller
//! that builds one, does a single write, and drops it immediately gets "throw-away" behavior —
//! the unpin-and-maybe-collect check runs at the end of the call either way.

use std::sync::Arc;
use std::time::SystemTime;

use crate::entity::Entity;
use crate::error::Result;
use crate::field::FieldMap;
use crate::metric::Metric;
use crate::value::Value;

/// A pin on one metric, valid for as long as this value is alive.
///
/// Dropping a `MetricContext` releases the pin and, if the metric is now unpinned with no
/// cells, asks its entity to drop it.
pub struct MetricContext {
    metric: Arc<Metric>,
    now: SystemTime,
}

impl MetricContext {
    pub(crate) fn new(metric: Arc<Metric>, now: SystemTime) -> Self {
        metric.pin();
        Self { metric, now }
    }

    pub fn metric_name(&self) -> &str {
        self.metric.name()
    }

    pub fn now(&self) -> SystemTime {
        self.now
    }

    pub fn get_value(&self, metric_fields: &FieldMap) -> Result<Value> {
        self.metric.get_value(metric_fields)
    }

    pub fn set_value(&self, metric_fields: FieldMap, value: Value) {
        self.metric.set_value(metric_fields, value, self.now);
    }

    pub fn add_to_int(&self, metric_fields: FieldMap, delta: i64) {
        self.metric.add_to_int(metric_fields, delta, self.now);
    }

    pub fn add_to_distribution(&self, metric_fields: FieldMap, sample: f64, times: usize) {
        self.metric.add_to_distribution(metric_fields, sample, times, self.now);
    }

    pub fn delete_value(&self, metric_fields: &FieldMap) -> bool {
        self.metric.delete_value(metric_fields)
    }

    pub fn clear(&self) -> bool {
        self.metric.clear()
    }
}

impl Drop for MetricContext {
    fn drop(&mut self) {
        if self.metric.unpin() {
            self.metric.notify_auto_collect();
        }
    }
}

/// A pin on one entity, valid for as long as this value is alive.
///
/// Dropping an `EntityContext` releases the pin and, if the entity is now unpinned with no
/// metrics, asks its shard to drop it.
pub struct EntityContext {
    entity: Arc<Entity>,
}

impl EntityContext {
    pub(crate) fn new(entity: Arc<Entity>) -> Self {
        entity.pin();
        Self { entity }
    }

    pub fn labels(&self) -> &FieldMap {
        self.entity.labels()
    }

    /// Pins `metric_name` on this entity, creating it from the shard's declared config if this
    /// is the first touch. The returned `MetricContext` keeps the metric (and transitively this
    /// entity, since the metric holds a live reference back to it) alive independent of this
    /// `EntityContext`'s own lifetime.
    pub fn pin_metric(&self, metric_name: &str, now: SystemTime) -> Result<MetricContext> {
        self.entity.pin_metric(metric_name, now)
    }
}

impl Drop for EntityContext {
    fn drop(&mut self) {
        if self.entity.unpin() {
            self.entity.notify_auto_collect();
        }
    }
}
