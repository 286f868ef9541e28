//! A single metric within an entity: the set of cells recorded against it, keyed by metric
//! field values, plus the pin count that keeps it alive while a caller holds a handle to it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::SystemTime;

use crate::cell::Cell;
use crate::config::MetricConfig;
use crate::error::{Result, TszError};
use crate::field::FieldMap;
use crate::value::Value;

/// Implemented by whatever owns a metric's name->`Metric` mapping (normally `Entity`), so that a
/// metric can ask to be dropped from that mapping once nothing references it anymore. A trait
/// rather than a concrete type so tests can exercise `Metric` against a fake owner.
pub trait MetricManager: Send + Sync {
    fn delete_metric_internal(&self, name: &str);
}

struct MetricState {
    cells: HashMap<FieldMap, Cell>,
    pin_count: usize,
    last_update_time: SystemTime,
}

pub struct Metric {
    manager: Weak<dyn MetricManager>,
    name: String,
    hash: u64,
    config: Arc<MetricConfig>,
    state: Mutex<MetricState>,
}

impl Metric {
    pub fn new(
        manager: Weak<dyn MetricManager>,
        name: String,
        hash: u64,
        config: Arc<MetricConfig>,
        now: SystemTime,
    ) -> Self {
        Self {
            manager,
            name,
            hash,
            config,
            state: Mutex::new(MetricState {
                cells: HashMap::new(),
                pin_count: 0,
                last_update_time: now,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    /// Increments the pin count, keeping the metric alive even if its cell set becomes empty.
    pub fn pin(&self) {
        self.state.lock().unwrap().pin_count += 1;
    }

    /// Decrements the pin count. Returns whether the metric is now eligible for
    /// auto-collection: no pins held and no recorded cells. The caller is responsible for then
    /// asking the manager to collect it, re-verifying under the manager's own lock.
    pub fn unpin(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.pin_count -= 1;
        state.pin_count == 0 && state.cells.is_empty()
    }

    /// Notifies the owning manager that this metric may be ready for collection. A no-op if the
    /// manager has already gone away.
    pub fn notify_auto_collect(&self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.delete_metric_internal(&self.name);
        }
    }

    pub fn get_value(&self, metric_fields: &FieldMap) -> Result<Value> {
        let state = self.state.lock().unwrap();
        state.cells.get(metric_fields).map(|cell| cell.value().clone()).ok_or_else(|| {
            TszError::NotFound(format!("no cell for metric fields {metric_fields:?}"))
        })
    }

    pub fn set_value(&self, metric_fields: FieldMap, value: Value, now: SystemTime) {
        let mut state = self.state.lock().unwrap();
        let hash = metric_fields.cached_hash();
        let key = metric_fields.clone();
        match state.cells.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().set_value(value, now);
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(Cell::new(metric_fields, hash, value, now));
            }
        }
        state.last_update_time = now;
    }

    pub fn add_to_int(&self, metric_fields: FieldMap, delta: i64, now: SystemTime) {
        let mut state = self.state.lock().unwrap();
        let hash = metric_fields.cached_hash();
        let key = metric_fields.clone();
        let cell = state
            .cells
            .entry(key)
            .or_insert_with(|| Cell::new(metric_fields, hash, Value::from(0i64), now));
        cell.add_to_int(delta, now);
        state.last_update_time = now;
    }

    pub fn add_to_distribution(
        &self,
        metric_fields: FieldMap,
        sample: f64,
        times: usize,
        now: SystemTime,
    ) {
        let mut state = self.state.lock().unwrap();
        let hash = metric_fields.cached_hash();
        let bucketer = self.config.bucketer.clone();
        let key = metric_fields.clone();
        let cell = state
            .cells
            .entry(key)
            .or_insert_with(|| Cell::new_distribution(metric_fields, hash, bucketer, now));
        cell.add_to_distribution(sample, times, now);
        state.last_update_time = now;
    }

    /// Removes a single cell. Returns whether a cell was actually present.
    pub fn delete_value(&self, metric_fields: &FieldMap) -> bool {
        let mut state = self.state.lock().unwrap();
        state.cells.remove(metric_fields).is_some()
    }

    /// Drops every cell recorded against this metric. Returns whether any cell was present.
    pub fn clear(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.cells.is_empty() {
            false
        } else {
            state.cells.clear();
            true
        }
    }

    /// Resets every cumulative cell to its zero value, restamping both timestamps. Used when an
    /// entity's default labels change underneath a cumulative metric. Returns whether this
    /// metric is cumulative (and therefore whether a reset actually happened).
    pub fn reset_if_cumulative(&self, now: SystemTime) -> bool {
        if !self.config.cumulative {
            return false;
        }
        let mut state = self.state.lock().unwrap();
        for cell in state.cells.values_mut() {
            cell.reset(now);
        }
        true
    }

    pub fn last_update_time(&self) -> SystemTime {
        self.state.lock().unwrap().last_update_time
    }

    pub fn is_pinned(&self) -> bool {
        self.state.lock().unwrap().pin_count > 0
    }

    pub fn cell_count(&self) -> usize {
        self.state.lock().unwrap().cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldValue;

    struct NullManager;
    impl MetricManager for NullManager {
        fn delete_metric_internal(&self, _name: &str) {}
    }

    fn fields(v: i64) -> FieldMap {
        FieldMap::from([("n", FieldValue::Int(v))])
    }

    fn new_metric() -> Metric {
        let manager: Arc<dyn MetricManager> = Arc::new(NullManager);
        Metric::new(
            Arc::downgrade(&manager),
            "/test/metric".to_string(),
            42,
            Arc::new(MetricConfig::default()),
            SystemTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn test_set_and_get_value() {
        let metric = new_metric();
        metric.set_value(fields(1), Value::from(10i64), SystemTime::UNIX_EPOCH);
        assert_eq!(metric.get_value(&fields(1)).unwrap(), Value::from(10i64));
    }

    #[test]
    fn test_get_value_missing() {
        let metric = new_metric();
        assert!(metric.get_value(&fields(1)).is_err());
    }

    #[test]
    fn test_add_to_int_creates_and_accumulates() {
        let metric = new_metric();
        metric.add_to_int(fields(1), 3, SystemTime::UNIX_EPOCH);
        metric.add_to_int(fields(1), 4, SystemTime::UNIX_EPOCH);
        assert_eq!(metric.get_value(&fields(1)).unwrap().as_int(), Some(7));
    }

    #[test]
    fn test_delete_value() {
        let metric = new_metric();
        metric.set_value(fields(1), Value::from(1i64), SystemTime::UNIX_EPOCH);
        assert!(metric.delete_value(&fields(1)));
        assert!(!metric.delete_value(&fields(1)));
        assert!(metric.get_value(&fields(1)).is_err());
    }

    #[test]
    fn test_clear() {
        let metric = new_metric();
        metric.set_value(fields(1), Value::from(1i64), SystemTime::UNIX_EPOCH);
        metric.set_value(fields(2), Value::from(2i64), SystemTime::UNIX_EPOCH);
        assert!(metric.clear());
        assert_eq!(metric.cell_count(), 0);
        assert!(!metric.clear());
    }

    #[test]
    fn test_pin_unpin_eligibility() {
        let metric = new_metric();
        metric.pin();
        assert!(metric.is_pinned());
        assert!(metric.unpin());
        assert!(!metric.is_pinned());
    }

    #[test]
    fn test_unpin_not_eligible_while_cells_present() {
        let metric = new_metric();
        metric.set_value(fields(1), Value::from(1i64), SystemTime::UNIX_EPOCH);
        metric.pin();
        assert!(!metric.unpin());
    }

    #[test]
    fn test_reset_if_cumulative() {
        let config = Arc::new(MetricConfig::default().set_cumulative(true));
        let manager: Arc<dyn MetricManager> = Arc::new(NullManager);
        let metric = Metric::new(
            Arc::downgrade(&manager),
            "/test/counter".to_string(),
            1,
            config,
            SystemTime::UNIX_EPOCH,
        );
        metric.add_to_int(fields(1), 5, SystemTime::UNIX_EPOCH);
        let later = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(10);
        assert!(metric.reset_if_cumulative(later));
        assert_eq!(metric.get_value(&fields(1)).unwrap().as_int(), Some(0));
        assert_eq!(metric.last_update_time(), SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn test_reset_if_cumulative_is_noop_for_non_cumulative_metric() {
        let metric = new_metric();
        metric.add_to_int(fields(1), 5, SystemTime::UNIX_EPOCH);
        let later = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(10);
        assert!(!metric.reset_if_cumulative(later));
        assert_eq!(metric.get_value(&fields(1)).unwrap().as_int(), Some(5));
    }
}
