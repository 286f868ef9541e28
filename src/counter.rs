//! A strongly-typed counter: a cumulative integer metric, only ever moved forward by `increment`
//! and `increment_by`.

use std::time::SystemTime;

use crate::config::MetricConfig;
use crate::exporter::EXPORTER;
use crate::field::FieldMap;
use crate::gauge::{log_write_failure, options_for};
use crate::utils::lazy::Lazy;

struct CounterImpl {
    name: &'static str,
}

impl CounterImpl {
    fn new(name: &'static str, config: MetricConfig, realm: String) -> Self {
        EXPORTER
            .define_metric_redundant(name, options_for(realm, config))
            .expect("counter metric declaration should never fail once validated");
        Self { name }
    }

    fn get(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> Option<i64> {
        EXPORTER.get_value(entity_labels, self.name, metric_fields).ok().and_then(|v| v.as_int())
    }

    fn increment_by(
        &self,
        entity_labels: &FieldMap,
        delta: i64,
        metric_fields: &FieldMap,
        now: SystemTime,
    ) {
        if let Err(err) =
            EXPORTER.add_to_int(entity_labels, self.name, metric_fields.clone(), delta, now)
        {
            log_write_failure(self.name, &err);
        }
    }

    fn delete(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> bool {
        EXPORTER.delete_value(entity_labels, self.name, metric_fields).unwrap_or(false)
    }

    fn clear(&self, entity_labels: &FieldMap) -> bool {
        EXPORTER.delete_metric_from_entity(entity_labels, self.name).unwrap_or(false)
    }
}

/// A cumulative integer metric, installed once in program-lifetime storage and declared lazily
/// on first use. Always forces `cumulative = true` and drops any configured bucketer, since
/// neither applies to a plain integer counter.
pub struct Counter {
    name: &'static str,
    config: MetricConfig,
    inner: Lazy<CounterImpl>,
}

impl Counter {
    pub fn new(name: &'static str, config: MetricConfig) -> Self {
        Self::in_realm(name, "default", config)
    }

    pub fn in_realm(name: &'static str, realm: &str, mut config: MetricConfig) -> Self {
        config.cumulative = true;
        config.bucketer = None;
        let realm = realm.to_string();
        let config_for_inner = config.clone();
        Self { name, config, inner: Lazy::new(move || CounterImpl::new(name, config_for_inner, realm)) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    pub fn get(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> Option<i64> {
        self.inner.get(entity_labels, metric_fields)
    }

    pub fn get_or_zero(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> i64 {
        self.get(entity_labels, metric_fields).unwrap_or(0)
    }

    pub fn increment_by(&self, delta: i64, entity_labels: &FieldMap, metric_fields: &FieldMap) {
        self.inner.increment_by(entity_labels, delta, metric_fields, SystemTime::now());
    }

    pub fn increment(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) {
        self.increment_by(1, entity_labels, metric_fields);
    }

    /// Deletes a single cell. Returns whether one was present.
    pub fn delete(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> bool {
        self.inner.delete(entity_labels, metric_fields)
    }

    /// Deletes every cell of this counter recorded against `entity_labels`.
    pub fn clear(&self, entity_labels: &FieldMap) -> bool {
        self.inner.clear(entity_labels)
    }
}
