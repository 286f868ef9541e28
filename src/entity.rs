//! An entity: a set of labels identifying e.g. a process or a host, together with the metrics
//! recorded against it within one shard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::SystemTime;

use crate::config::MetricConfig;
use crate::context::MetricContext;
use crate::error::{Result, TszError};
use crate::field::FieldMap;
use crate::metric::{Metric, MetricManager};
use crate::value::Value;

/// Implemented by whatever owns an entity's labels->`Entity` mapping (normally `Shard`), and
/// also hands back the declared configuration for a metric name so an `Entity` can create
/// metrics lazily on first write.
pub trait EntityManager: Send + Sync {
    fn config_for_metric(&self, name: &str) -> Result<Arc<MetricConfig>>;
    fn delete_entity_internal(&self, labels: &FieldMap);
}

struct EntityState {
    metrics: HashMap<String, Arc<Metric>>,
    pin_count: usize,
}

pub struct Entity {
    manager: Weak<dyn EntityManager>,
    labels: FieldMap,
    hash: u64,
    state: Mutex<EntityState>,
}

impl Entity {
    pub fn new(manager: Weak<dyn EntityManager>, labels: FieldMap, hash: u64) -> Arc<Self> {
        Arc::new(Self {
            manager,
            labels,
            hash,
            state: Mutex::new(EntityState { metrics: HashMap::new(), pin_count: 0 }),
        })
    }

    pub fn labels(&self) -> &FieldMap {
        &self.labels
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn pin(&self) {
        self.state.lock().unwrap().pin_count += 1;
    }

    /// Mirrors `Metric::unpin`: decrements the pin count and reports eligibility for
    /// auto-collection (no pins, no metrics) without acting on it.
    pub fn unpin(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.pin_count -= 1;
        state.pin_count == 0 && state.metrics.is_empty()
    }

    pub fn notify_auto_collect(&self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.delete_entity_internal(&self.labels);
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.state.lock().unwrap().pin_count > 0
    }

    pub fn metric_count(&self) -> usize {
        self.state.lock().unwrap().metrics.len()
    }

    fn get_or_create_metric(
        self: &Arc<Self>,
        name: &str,
        now: SystemTime,
    ) -> Result<Arc<Metric>> {
        let mut state = self.state.lock().unwrap();
        if let Some(metric) = state.metrics.get(name) {
            return Ok(Arc::clone(metric));
        }
        let manager = self.manager.upgrade().ok_or_else(|| {
            TszError::FailedPrecondition("entity's shard has been dropped".to_string())
        })?;
        let config = manager.config_for_metric(name)?;
        let self_as_manager: Weak<dyn MetricManager> = Arc::downgrade(self);
        let hash = crate::utils::hash_str(name);
        let metric = Arc::new(Metric::new(self_as_manager, name.to_string(), hash, config, now));
        state.metrics.insert(name.to_string(), Arc::clone(&metric));
        Ok(metric)
    }

    fn get_metric(&self, name: &str) -> Option<Arc<Metric>> {
        self.state.lock().unwrap().metrics.get(name).cloned()
    }

    /// Pins `name` for the caller, creating it from the manager's declared config on first
    /// touch. This is the entity-level half of a write or read context: the returned
    /// `MetricContext` keeps the metric alive until dropped, at which point it is offered back
    /// for auto-collection if it has become empty and unpinned.
    pub fn pin_metric(self: &Arc<Self>, name: &str, now: SystemTime) -> Result<MetricContext> {
        let metric = self.get_or_create_metric(name, now)?;
        Ok(MetricContext::new(metric, now))
    }

    pub fn get_value(&self, name: &str, metric_fields: &FieldMap) -> Result<Value> {
        match self.get_metric(name) {
            Some(metric) => metric.get_value(metric_fields),
            None => Err(TszError::NotFound(format!("metric {name:?} has no value on this entity"))),
        }
    }

    pub fn set_value(
        self: &Arc<Self>,
        name: &str,
        metric_fields: FieldMap,
        value: Value,
        now: SystemTime,
    ) -> Result<()> {
        let ctx = self.pin_metric(name, now)?;
        ctx.set_value(metric_fields, value);
        Ok(())
    }

    pub fn add_to_int(
        self: &Arc<Self>,
        name: &str,
        metric_fields: FieldMap,
        delta: i64,
        now: SystemTime,
    ) -> Result<()> {
        let ctx = self.pin_metric(name, now)?;
        ctx.add_to_int(metric_fields, delta);
        Ok(())
    }

    pub fn add_to_distribution(
        self: &Arc<Self>,
        name: &str,
        metric_fields: FieldMap,
        sample: f64,
        times: usize,
        now: SystemTime,
    ) -> Result<()> {
        let ctx = self.pin_metric(name, now)?;
        ctx.add_to_distribution(metric_fields, sample, times);
        Ok(())
    }

    pub fn delete_value(&self, name: &str, metric_fields: &FieldMap) -> bool {
        match self.get_metric(name) {
            Some(metric) => {
                let removed = metric.delete_value(metric_fields);
                self.maybe_collect_metric(name, &metric);
                removed
            }
            None => false,
        }
    }

    /// Deletes every cell of `name` on this entity. Returns whether the metric was present.
    pub fn delete_metric(&self, name: &str) -> bool {
        match self.get_metric(name) {
            Some(metric) => {
                let removed = metric.clear();
                self.maybe_collect_metric(name, &metric);
                removed
            }
            None => false,
        }
    }

    fn maybe_collect_metric(&self, name: &str, metric: &Arc<Metric>) {
        if !metric.is_pinned() && metric.cell_count() == 0 {
            let mut state = self.state.lock().unwrap();
            if let Some(existing) = state.metrics.get(name) {
                if Arc::ptr_eq(existing, metric) && !metric.is_pinned() && metric.cell_count() == 0
                {
                    state.metrics.remove(name);
                }
            }
        }
    }

    /// Called back by a `Metric` (via `MetricManager`) once it decided it is unpinned and
    /// empty; re-verifies under this entity's own lock before actually removing it, since
    /// another writer could have re-pinned or re-populated it in the meantime.
    fn delete_metric_internal(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(metric) = state.metrics.get(name) {
            if !metric.is_pinned() && metric.cell_count() == 0 {
                state.metrics.remove(name);
            }
        }
    }
}

impl MetricManager for Entity {
    fn delete_metric_internal(&self, name: &str) {
        Entity::delete_metric_internal(self, name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldValue;

    struct NullManager;
    impl EntityManager for NullManager {
        fn config_for_metric(&self, _name: &str) -> Result<Arc<MetricConfig>> {
            Ok(Arc::new(MetricConfig::default()))
        }
        fn delete_entity_internal(&self, _labels: &FieldMap) {}
    }

    fn new_entity() -> Arc<Entity> {
        let manager: Arc<dyn EntityManager> = Arc::new(NullManager);
        Entity::new(Arc::downgrade(&manager), FieldMap::empty(), 0)
    }

    fn fields() -> FieldMap {
        FieldMap::from([("foo", FieldValue::Int(1))])
    }

    #[test]
    fn test_set_and_get_value_creates_metric_lazily() {
        let entity = new_entity();
        entity.set_value("/a/b", fields(), Value::from(1i64), SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(entity.get_value("/a/b", &fields()).unwrap(), Value::from(1i64));
    }

    #[test]
    fn test_get_value_missing_metric() {
        let entity = new_entity();
        assert!(entity.get_value("/a/b", &fields()).is_err());
    }

    #[test]
    fn test_delete_value_auto_collects_metric() {
        let entity = new_entity();
        entity.add_to_int("/a/b", fields(), 1, SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(entity.metric_count(), 1);
        entity.delete_value("/a/b", &fields());
        assert_eq!(entity.metric_count(), 0);
    }

    #[test]
    fn test_pinned_metric_survives_delete() {
        let entity = new_entity();
        entity.add_to_int("/a/b", fields(), 1, SystemTime::UNIX_EPOCH).unwrap();
        let metric = entity.get_metric("/a/b").unwrap();
        metric.pin();
        entity.delete_value("/a/b", &fields());
        assert_eq!(entity.metric_count(), 1);
        metric.unpin();
    }

    #[test]
    fn test_entity_pin_unpin() {
        let entity = new_entity();
        entity.pin();
        assert!(entity.is_pinned());
        assert!(entity.unpin());
    }
}
