//! A strongly-typed event metric: a distribution accumulated via `record`/`record_many`.

use std::time::SystemTime;

use crate::bucketer::BucketerRef;
use crate::config::MetricConfig;
use crate::distribution::Distribution;
use crate::exporter::EXPORTER;
use crate::field::FieldMap;
use crate::gauge::{log_write_failure, options_for};
use crate::utils::lazy::Lazy;

struct EventMetricImpl {
    name: &'static str,
}

impl EventMetricImpl {
    fn new(name: &'static str, config: MetricConfig, realm: String) -> Self {
        EXPORTER
            .define_metric_redundant(name, options_for(realm, config))
            .expect("event metric declaration should never fail once validated");
        Self { name }
    }

    fn get(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> Option<Distribution> {
        EXPORTER
            .get_value(entity_labels, self.name, metric_fields)
            .ok()
            .and_then(|v| v.as_distribution().cloned())
    }

    fn record(
        &self,
        entity_labels: &FieldMap,
        sample: f64,
        times: usize,
        metric_fields: &FieldMap,
        now: SystemTime,
    ) {
        if let Err(err) = EXPORTER.add_to_distribution(
            entity_labels,
            self.name,
            metric_fields.clone(),
            sample,
            times,
            now,
        ) {
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

/// A distribution metric, installed once in program-lifetime storage and declared lazily on
/// first use. Always forces `cumulative = true` and falls back to the process-wide default
/// bucketer if the caller didn't configure one.
pub struct EventMetric {
    name: &'static str,
    config: MetricConfig,
    inner: Lazy<EventMetricImpl>,
}

impl EventMetric {
    pub fn new(name: &'static str, config: MetricConfig) -> Self {
        Self::in_realm(name, "default", config)
    }

    pub fn in_realm(name: &'static str, realm: &str, mut config: MetricConfig) -> Self {
        config.cumulative = true;
        if config.bucketer.is_none() {
            config.bucketer = Some(BucketerRef::default());
        }
        let realm = realm.to_string();
        let config_for_inner = config.clone();
        Self {
            name,
            config,
            inner: Lazy::new(move || EventMetricImpl::new(name, config_for_inner, realm)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    pub fn bucketer(&self) -> BucketerRef {
        self.config.bucketer.unwrap()
    }

    pub fn get(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> Option<Distribution> {
        self.inner.get(entity_labels, metric_fields)
    }

    pub fn get_or_empty(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> Distribution {
        self.get(entity_labels, metric_fields).unwrap_or_else(|| Distribution::new(self.bucketer()))
    }

    pub fn record(&self, sample: f64, entity_labels: &FieldMap, metric_fields: &FieldMap) {
        self.record_many(sample, 1, entity_labels, metric_fields);
    }

    pub fn record_many(
        &self,
        sample: f64,
        times: usize,
        entity_labels: &FieldMap,
        metric_fields: &FieldMap,
    ) {
        self.inner.record(entity_labels, sample, times, metric_fields, SystemTime::now());
    }

    /// Deletes a single cell. Returns whether one was present.
    pub fn delete(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> bool {
        self.inner.delete(entity_labels, metric_fields)
    }

    /// Deletes every cell of this metric recorded against `entity_labels`.
    pub fn clear(&self, entity_labels: &FieldMap) -> bool {
        self.inner.clear(entity_labels)
    }
}
