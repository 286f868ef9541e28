//! The process-wide metric registry: a mapping from realm name to `Shard`, plus a mapping from
//! metric name to the realm it was declared in, so that a metric name alone is enough to find
//! the shard holding its data.
//!
//! Both mappings are append-only for the lifetime of the process (metric and realm names are
//! never un-declared), which is exactly the access pattern `LockFreeHashMap` is built for.

use std::sync::{Arc, LazyLock};
use std::time::{Duration, SystemTime};

use crate::config::MetricConfig;
use crate::error::{Result, TszError};
use crate::field::FieldMap;
use crate::lock_free_map::LockFreeHashMap;
use crate::shard::Shard;
use crate::value::Value;

pub static EXPORTER: LazyLock<Exporter> = LazyLock::new(Exporter::new);

/// Declaration-time options for a metric, as passed to `Exporter::define_metric`. Distinct from
/// `MetricConfig` because it also carries the realm, which only matters at declaration time and
/// is never consulted again afterwards.
#[derive(Debug, Clone)]
pub struct Options {
    pub realm: String,
    pub cumulative: bool,
    pub skip_stable_cells: bool,
    pub delta_mode: bool,
    pub user_timestamps: bool,
    pub bucketer: Option<crate::bucketer::BucketerRef>,
    pub max_entity_staleness: Option<Duration>,
    pub max_value_staleness: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            realm: "default".to_string(),
            cumulative: false,
            skip_stable_cells: false,
            delta_mode: false,
            user_timestamps: false,
            bucketer: None,
            max_entity_staleness: None,
            max_value_staleness: None,
        }
    }
}

impl Options {
    fn into_config(self) -> MetricConfig {
        MetricConfig {
            cumulative: self.cumulative,
            skip_stable_cells: self.skip_stable_cells,
            delta_mode: self.delta_mode,
            user_timestamps: self.user_timestamps,
            bucketer: self.bucketer,
            max_entity_staleness: self.max_entity_staleness,
            max_value_staleness: self.max_value_staleness,
        }
    }
}

pub struct Exporter {
    metrics_to_realms: LockFreeHashMap<String, String>,
    realms_to_shards: LockFreeHashMap<String, Arc<Shard>>,
}

impl Exporter {
    fn new() -> Self {
        Self {
            metrics_to_realms: LockFreeHashMap::new(),
            realms_to_shards: LockFreeHashMap::new(),
        }
    }

    fn shard_for_realm(&self, realm: &str) -> Arc<Shard> {
        Arc::clone(self.realms_to_shards.get_or_insert_with(realm.to_string(), Shard::new).0)
    }

    pub fn define_metric(&self, metric_name: &str, options: Options) -> Result<Arc<Shard>> {
        let realm = options.realm.clone();
        let shard = self.shard_for_realm(&realm);
        shard.define_metric(metric_name, options.into_config())?;
        match self.metrics_to_realms.try_insert(metric_name.to_string(), realm) {
            Ok(_) => Ok(shard),
            Err(_) => Err(TszError::AlreadyExists(format!(
                "metric {metric_name:?} is already defined in another realm"
            ))),
        }
    }

    pub fn define_metric_redundant(&self, metric_name: &str, options: Options) -> Result<Arc<Shard>> {
        let realm = options.realm.clone();
        let shard = self.shard_for_realm(&realm);
        shard.define_metric_redundant(metric_name, options.into_config())?;
        self.metrics_to_realms.get_or_insert_with(metric_name.to_string(), || realm);
        Ok(shard)
    }

    pub fn get_shard_for_metric(&self, metric_name: &str) -> Result<Arc<Shard>> {
        let realm = self
            .metrics_to_realms
            .get(metric_name)
            .ok_or_else(|| TszError::NotFound(format!("metric {metric_name:?} is not defined")))?;
        self.realms_to_shards
            .get(realm.as_str())
            .cloned()
            .ok_or_else(|| TszError::NotFound(format!("metric {metric_name:?} is not defined")))
    }

    pub fn get_value(
        &self,
        entity_labels: &FieldMap,
        metric_name: &str,
        metric_fields: &FieldMap,
    ) -> Result<Value> {
        self.get_shard_for_metric(metric_name)?.get_value(entity_labels, metric_name, metric_fields)
    }

    pub fn set_value(
        &self,
        entity_labels: &FieldMap,
        metric_name: &str,
        metric_fields: FieldMap,
        value: Value,
        now: SystemTime,
    ) -> Result<()> {
        self.get_shard_for_metric(metric_name)?.set_value(
            entity_labels,
            metric_name,
            metric_fields,
            value,
            now,
        )
    }

    pub fn add_to_int(
        &self,
        entity_labels: &FieldMap,
        metric_name: &str,
        metric_fields: FieldMap,
        delta: i64,
        now: SystemTime,
    ) -> Result<()> {
        self.get_shard_for_metric(metric_name)?.add_to_int(
            entity_labels,
            metric_name,
            metric_fields,
            delta,
            now,
        )
    }

    pub fn add_to_distribution(
        &self,
        entity_labels: &FieldMap,
        metric_name: &str,
        metric_fields: FieldMap,
        sample: f64,
        times: usize,
        now: SystemTime,
    ) -> Result<()> {
        self.get_shard_for_metric(metric_name)?.add_to_distribution(
            entity_labels,
            metric_name,
            metric_fields,
            sample,
            times,
            now,
        )
    }

    pub fn delete_value(
        &self,
        entity_labels: &FieldMap,
        metric_name: &str,
        metric_fields: &FieldMap,
    ) -> Result<bool> {
        Ok(self.get_shard_for_metric(metric_name)?.delete_value(entity_labels, metric_name, metric_fields))
    }

    pub fn delete_metric_from_entity(&self, entity_labels: &FieldMap, metric_name: &str) -> Result<bool> {
        Ok(self
            .get_shard_for_metric(metric_name)?
            .delete_metric_from_entity(entity_labels, metric_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_metric_and_round_trip() {
        let exporter = Exporter::new();
        exporter
            .define_metric(
                "/exporter/test/a",
                Options { realm: "r1".to_string(), ..Default::default() },
            )
            .unwrap();
        exporter
            .set_value(
                &FieldMap::empty(),
                "/exporter/test/a",
                FieldMap::empty(),
                Value::from(5i64),
                SystemTime::UNIX_EPOCH,
            )
            .unwrap();
        assert_eq!(
            exporter.get_value(&FieldMap::empty(), "/exporter/test/a", &FieldMap::empty()).unwrap(),
            Value::from(5i64)
        );
    }

    #[test]
    fn test_define_metric_twice_fails() {
        let exporter = Exporter::new();
        exporter.define_metric("/exporter/test/b", Options::default()).unwrap();
        assert!(exporter.define_metric("/exporter/test/b", Options::default()).is_err());
    }

    #[test]
    fn test_get_shard_for_undefined_metric() {
        let exporter = Exporter::new();
        assert!(exporter.get_shard_for_metric("/not/defined").is_err());
    }

    #[test]
    fn test_different_realms_get_different_shards() {
        let exporter = Exporter::new();
        exporter
            .define_metric("/r1/m", Options { realm: "r1".to_string(), ..Default::default() })
            .unwrap();
        exporter
            .define_metric("/r2/m", Options { realm: "r2".to_string(), ..Default::default() })
            .unwrap();
        let shard1 = exporter.get_shard_for_metric("/r1/m").unwrap();
        let shard2 = exporter.get_shard_for_metric("/r2/m").unwrap();
        assert!(!Arc::ptr_eq(&shard1, &shard2));
    }
}
