//! A shard: the per-realm store of metric configurations and entities. Metric names are
//! globally unique across all shards (enforced one level up, by `Exporter`), but the entities
//! and cells for a given metric all live inside a single shard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::SystemTime;

use crate::config::{MetricConfig, validate_metric_name};
use crate::context::EntityContext;
use crate::entity::{Entity, EntityManager};
use crate::error::{Result, TszError};
use crate::field::FieldMap;
use crate::lock_free_map::LockFreeHashMap;
use crate::value::Value;

/// The per-realm store of metric configurations and entities.
///
/// `metric_configs` is the lock-free hash container's primary use in this crate: declarations
/// only ever add entries (a metric, once defined, is never un-defined), which is exactly the
/// append-only access pattern the container is built for, and it lets `Metric` hold a stable
/// `Arc<MetricConfig>` clone that survives concurrent declarations of other names. `entities`
/// churns (entities come and go as labels are first touched and later auto-collected) so it
/// stays a plain mutex-guarded map, guarded by this shard's own writer lock.
pub struct Shard {
    metric_configs: LockFreeHashMap<String, Arc<MetricConfig>>,
    entities: Mutex<HashMap<FieldMap, Arc<Entity>>>,
}

impl Shard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { metric_configs: LockFreeHashMap::new(), entities: Mutex::new(HashMap::new()) })
    }

    /// Declares `name` with `config`. Fails if the name is already declared in this shard.
    pub fn define_metric(&self, name: &str, config: MetricConfig) -> Result<()> {
        validate_metric_name(name)?;
        match self.metric_configs.try_insert(name.to_string(), Arc::new(config)) {
            Ok(_) => Ok(()),
            Err(_) => Err(TszError::AlreadyExists(format!("metric {name:?} is already defined"))),
        }
    }

    /// Declares `name` with `config` if absent; a no-op (keeping the existing configuration) if
    /// already declared. Used by metric types that redeclare themselves on every lazy resolve.
    pub fn define_metric_redundant(&self, name: &str, config: MetricConfig) -> Result<()> {
        validate_metric_name(name)?;
        self.metric_configs.get_or_insert_with(name.to_string(), || Arc::new(config));
        Ok(())
    }

    fn config_for_metric_locked(&self, name: &str) -> Result<Arc<MetricConfig>> {
        self.metric_configs
            .get(name)
            .cloned()
            .ok_or_else(|| TszError::NotFound(format!("metric {name:?} is not defined")))
    }

    /// Pins `entity_labels` for the caller, creating the entity on first touch. The returned
    /// `EntityContext` in turn lets the caller pin one of the entity's metrics.
    pub fn get_pinned_entity(self: &Arc<Self>, entity_labels: &FieldMap) -> EntityContext {
        EntityContext::new(self.get_entity(entity_labels))
    }

    fn get_entity(self: &Arc<Self>, entity_labels: &FieldMap) -> Arc<Entity> {
        let mut entities = self.entities.lock().unwrap();
        if let Some(entity) = entities.get(entity_labels) {
            return Arc::clone(entity);
        }
        let self_as_manager: Weak<dyn EntityManager> = Arc::downgrade(self);
        let hash = crate::utils::hash_value(entity_labels);
        let entity = Entity::new(self_as_manager, entity_labels.clone(), hash);
        entities.insert(entity_labels.clone(), Arc::clone(&entity));
        entity
    }

    fn get_ephemeral_entity(&self, entity_labels: &FieldMap) -> Option<Arc<Entity>> {
        self.entities.lock().unwrap().get(entity_labels).cloned()
    }

    pub fn get_value(
        &self,
        entity_labels: &FieldMap,
        metric_name: &str,
        metric_fields: &FieldMap,
    ) -> Result<Value> {
        match self.get_ephemeral_entity(entity_labels) {
            Some(entity) => entity.get_value(metric_name, metric_fields),
            None => Err(TszError::NotFound(format!("entity {entity_labels:?} is not defined"))),
        }
    }

    /// Writes go through the full entity-context + metric-context chain: the entity is pinned
    /// for the duration of the call, the metric is pinned within that, and both pins are
    /// released (with an auto-collection check) as the contexts drop at the end of the call.
    pub fn set_value(
        self: &Arc<Self>,
        entity_labels: &FieldMap,
        metric_name: &str,
        metric_fields: FieldMap,
        value: Value,
        now: SystemTime,
    ) -> Result<()> {
        let entity_ctx = self.get_pinned_entity(entity_labels);
        let metric_ctx = entity_ctx.pin_metric(metric_name, now)?;
        metric_ctx.set_value(metric_fields, value);
        Ok(())
    }

    pub fn add_to_int(
        self: &Arc<Self>,
        entity_labels: &FieldMap,
        metric_name: &str,
        metric_fields: FieldMap,
        delta: i64,
        now: SystemTime,
    ) -> Result<()> {
        let entity_ctx = self.get_pinned_entity(entity_labels);
        let metric_ctx = entity_ctx.pin_metric(metric_name, now)?;
        metric_ctx.add_to_int(metric_fields, delta);
        Ok(())
    }

    pub fn add_to_distribution(
        self: &Arc<Self>,
        entity_labels: &FieldMap,
        metric_name: &str,
        metric_fields: FieldMap,
        sample: f64,
        times: usize,
        now: SystemTime,
    ) -> Result<()> {
        let entity_ctx = self.get_pinned_entity(entity_labels);
        let metric_ctx = entity_ctx.pin_metric(metric_name, now)?;
        metric_ctx.add_to_distribution(metric_fields, sample, times);
        Ok(())
    }

    pub fn delete_value(
        &self,
        entity_labels: &FieldMap,
        metric_name: &str,
        metric_fields: &FieldMap,
    ) -> bool {
        match self.get_ephemeral_entity(entity_labels) {
            Some(entity) => {
                let removed = entity.delete_value(metric_name, metric_fields);
                self.delete_entity_internal(entity_labels);
                removed
            }
            None => false,
        }
    }

    /// Deletes `metric_name` from a single entity.
    pub fn delete_metric_from_entity(&self, entity_labels: &FieldMap, metric_name: &str) -> bool {
        match self.get_ephemeral_entity(entity_labels) {
            Some(entity) => {
                let removed = entity.delete_metric(metric_name);
                self.delete_entity_internal(entity_labels);
                removed
            }
            None => false,
        }
    }

    /// Deletes `metric_name` from every entity in this shard. Repeats passes until one removes
    /// nothing, since new cells may be written concurrently with the sweep.
    pub fn delete_metric(&self, metric_name: &str) -> bool {
        let mut any_removed = false;
        loop {
            let entities: Vec<Arc<Entity>> =
                self.entities.lock().unwrap().values().cloned().collect();
            let mut removed_this_pass = false;
            for entity in entities {
                if entity.delete_metric(metric_name) {
                    removed_this_pass = true;
                    any_removed = true;
                }
                self.delete_entity_internal(entity.labels());
            }
            if !removed_this_pass {
                break;
            }
        }
        any_removed
    }

    pub fn delete_entity(&self, entity_labels: &FieldMap) -> bool {
        let entity = match self.get_ephemeral_entity(entity_labels) {
            Some(entity) => entity,
            None => return false,
        };
        if entity.is_pinned() || entity.metric_count() != 0 {
            return false;
        }
        let mut entities = self.entities.lock().unwrap();
        if let Some(existing) = entities.get(entity_labels) {
            if Arc::ptr_eq(existing, &entity) && !entity.is_pinned() && entity.metric_count() == 0
            {
                entities.remove(entity_labels);
                return true;
            }
        }
        false
    }

    fn delete_entity_internal(&self, entity_labels: &FieldMap) {
        let mut entities = self.entities.lock().unwrap();
        if let Some(entity) = entities.get(entity_labels) {
            if !entity.is_pinned() && entity.metric_count() == 0 {
                entities.remove(entity_labels);
            }
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.lock().unwrap().len()
    }

    /// All metric names declared on this shard. Loosely consistent, per the lock-free map's
    /// iteration semantics: a concurrent declaration may or may not be observed.
    pub fn metric_names(&self) -> Vec<String> {
        self.metric_configs.iter().map(|(name, _)| name.clone()).collect()
    }
}

impl EntityManager for Shard {
    fn config_for_metric(&self, name: &str) -> Result<Arc<MetricConfig>> {
        self.config_for_metric_locked(name)
    }

    fn delete_entity_internal(&self, labels: &FieldMap) {
        Shard::delete_entity_internal(self, labels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldValue;

    fn fields(v: i64) -> FieldMap {
        FieldMap::from([("entity", FieldValue::Int(v))])
    }

    #[test]
    fn test_define_metric_rejects_duplicate() {
        let shard = Shard::new();
        shard.define_metric("/a/b", MetricConfig::default()).unwrap();
        assert!(shard.define_metric("/a/b", MetricConfig::default()).is_err());
    }

    #[test]
    fn test_define_metric_redundant_is_idempotent() {
        let shard = Shard::new();
        shard.define_metric_redundant("/a/b", MetricConfig::default()).unwrap();
        shard.define_metric_redundant("/a/b", MetricConfig::default()).unwrap();
    }

    #[test]
    fn test_define_metric_rejects_invalid_name() {
        let shard = Shard::new();
        assert!(shard.define_metric("a/b", MetricConfig::default()).is_err());
    }

    #[test]
    fn test_set_and_get_value_roundtrip() {
        let shard = Shard::new();
        shard.define_metric_redundant("/a/b", MetricConfig::default()).unwrap();
        shard
            .set_value(&fields(1), "/a/b", FieldMap::empty(), Value::from(7i64), SystemTime::UNIX_EPOCH)
            .unwrap();
        assert_eq!(
            shard.get_value(&fields(1), "/a/b", &FieldMap::empty()).unwrap(),
            Value::from(7i64)
        );
    }

    #[test]
    fn test_get_value_undefined_entity() {
        let shard = Shard::new();
        assert!(shard.get_value(&fields(1), "/a/b", &FieldMap::empty()).is_err());
    }

    #[test]
    fn test_delete_entity_requires_empty_and_unpinned() {
        let shard = Shard::new();
        shard.define_metric_redundant("/a/b", MetricConfig::default()).unwrap();
        shard
            .add_to_int(&fields(1), "/a/b", FieldMap::empty(), 1, SystemTime::UNIX_EPOCH)
            .unwrap();
        assert!(!shard.delete_entity(&fields(1)));
    }

    #[test]
    fn test_deleting_last_metric_auto_collects_entity() {
        let shard = Shard::new();
        shard.define_metric_redundant("/a/b", MetricConfig::default()).unwrap();
        shard
            .add_to_int(&fields(1), "/a/b", FieldMap::empty(), 1, SystemTime::UNIX_EPOCH)
            .unwrap();
        assert_eq!(shard.entity_count(), 1);
        shard.delete_metric_from_entity(&fields(1), "/a/b");
        assert_eq!(shard.entity_count(), 0);
        assert!(shard.get_value(&fields(1), "/a/b", &FieldMap::empty()).is_err());
    }

    #[test]
    fn test_delete_metric_sweeps_all_entities() {
        let shard = Shard::new();
        shard.define_metric_redundant("/a/b", MetricConfig::default()).unwrap();
        shard
            .add_to_int(&fields(1), "/a/b", FieldMap::empty(), 1, SystemTime::UNIX_EPOCH)
            .unwrap();
        shard
            .add_to_int(&fields(2), "/a/b", FieldMap::empty(), 1, SystemTime::UNIX_EPOCH)
            .unwrap();
        assert!(shard.delete_metric("/a/b"));
        assert!(shard.get_value(&fields(1), "/a/b", &FieldMap::empty()).is_err());
        assert!(shard.get_value(&fields(2), "/a/b", &FieldMap::empty()).is_err());
    }
}
