//! A strongly-typed gauge: the last value written for a given (entity, metric fields) pair.
//!
//! Mirrors the teacher's own simplification of the source's template-heavy, compile-time entity
//! label/metric field schema: rather than reconstructing that at the type level, callers hand a
//! `FieldMap` built however they like, and `Gauge<V>` only adds the value-type specialisation and
//! the lazy, once-only metric declaration.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};

use crate::config::MetricConfig;
use crate::error::TszError;
use crate::exporter::{EXPORTER, Options};
use crate::field::FieldMap;
use crate::utils::lazy::Lazy;
use crate::utils::rate_limiter::RateLimiter;
use crate::value::Value;

/// Shared by every user-facing metric type's write path: a write can fail only if the metric
/// turns out to be undefined (e.g. a realm mismatch against an earlier declaration under the
/// same name), and that failure must never propagate to the caller. Log it instead, rate-limited
/// per metric name so a hot loop hammering a bad write can't flood the log.
static WRITE_FAILURE_RATE_LIMITER: LazyLock<RateLimiter> =
    LazyLock::new(|| RateLimiter::new(Duration::from_secs(30)));

pub(crate) fn log_write_failure(metric_name: &str, err: &TszError) {
    if WRITE_FAILURE_RATE_LIMITER.allow(metric_name) {
        tracing::error!(metric = metric_name, error = %err, "tsz write against undefined metric");
    }
}

/// Value types a `Gauge` may hold. Sealed to the scalar variants of `Value` — distributions are
/// recorded through `EventMetric` instead.
pub trait GaugeValue: Debug + Send + Sync + 'static {
    fn into_value(self) -> Value;
    fn from_value(value: &Value) -> Option<Self>
    where
        Self: Sized;
}

impl GaugeValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl GaugeValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }
}

impl GaugeValue for f64 {
    fn into_value(self) -> Value {
        Value::from(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_float()
    }
}

impl GaugeValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

struct GaugeImpl<V: GaugeValue> {
    name: &'static str,
    _value: PhantomData<V>,
}

impl<V: GaugeValue> GaugeImpl<V> {
    fn new(name: &'static str, config: MetricConfig, realm: String) -> Self {
        EXPORTER
            .define_metric_redundant(name, options_for(realm, config))
            .expect("gauge metric declaration should never fail once validated");
        Self { name, _value: PhantomData }
    }

    fn get(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> Option<V> {
        EXPORTER.get_value(entity_labels, self.name, metric_fields).ok().and_then(|v| V::from_value(&v))
    }

    fn set(&self, value: V, entity_labels: &FieldMap, metric_fields: &FieldMap, now: SystemTime) {
        if let Err(err) =
            EXPORTER.set_value(entity_labels, self.name, metric_fields.clone(), value.into_value(), now)
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

/// Folds a `MetricConfig` (the per-metric surface) into an `Options` (the declaration-time
/// surface, which additionally carries the realm) for a call to `EXPORTER.define_metric*`.
pub(crate) fn options_for(realm: String, config: MetricConfig) -> Options {
    Options {
        realm,
        cumulative: config.cumulative,
        skip_stable_cells: config.skip_stable_cells,
        delta_mode: config.delta_mode,
        user_timestamps: config.user_timestamps,
        bucketer: config.bucketer,
        max_entity_staleness: config.max_entity_staleness,
        max_value_staleness: config.max_value_staleness,
    }
}

/// A last-value metric of value type `V`, installed once in program-lifetime storage (typically
/// a `static`) and declared lazily on first use.
pub struct Gauge<V: GaugeValue> {
    name: &'static str,
    config: MetricConfig,
    inner: Lazy<GaugeImpl<V>>,
}

impl<V: GaugeValue> Gauge<V> {
    pub fn new(name: &'static str, config: MetricConfig) -> Self {
        Self::in_realm(name, "default", config)
    }

    pub fn in_realm(name: &'static str, realm: &str, config: MetricConfig) -> Self {
        let realm = realm.to_string();
        let config_for_inner = config.clone();
        Self {
            name,
            config,
            inner: Lazy::new(move || GaugeImpl::<V>::new(name, config_for_inner, realm)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    pub fn get(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> Option<V> {
        self.inner.get(entity_labels, metric_fields)
    }

    pub fn set(&self, value: V, entity_labels: &FieldMap, metric_fields: &FieldMap) {
        self.set_at(value, entity_labels, metric_fields, SystemTime::now());
    }

    pub fn set_at(&self, value: V, entity_labels: &FieldMap, metric_fields: &FieldMap, now: SystemTime) {
        self.inner.set(value, entity_labels, metric_fields, now);
    }

    /// Deletes a single cell. Returns whether one was present.
    pub fn delete(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> bool {
        self.inner.delete(entity_labels, metric_fields)
    }

    /// Deletes every cell of this gauge recorded against `entity_labels`.
    pub fn clear(&self, entity_labels: &FieldMap) -> bool {
        self.inner.clear(entity_labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldValue;

    fn entity() -> FieldMap {
        FieldMap::from([("lorem", FieldValue::Str("ipsum".into()))])
    }

    fn fields() -> FieldMap {
        FieldMap::from([("k", FieldValue::Int(1))])
    }

    #[test]
    fn test_new_and_missing_get() {
        let gauge = Gauge::<i64>::new("/gauge/test/a", MetricConfig::default());
        assert_eq!(gauge.name(), "/gauge/test/a");
        assert!(gauge.get(&entity(), &fields()).is_none());
    }

    #[test]
    fn test_set_and_get_int() {
        let gauge = Gauge::<i64>::new("/gauge/test/b", MetricConfig::default());
        gauge.set_at(42, &entity(), &fields(), SystemTime::UNIX_EPOCH);
        assert_eq!(gauge.get(&entity(), &fields()), Some(42));
    }

    #[test]
    fn test_set_and_get_bool() {
        let gauge = Gauge::<bool>::new("/gauge/test/c", MetricConfig::default());
        gauge.set_at(true, &entity(), &fields(), SystemTime::UNIX_EPOCH);
        assert_eq!(gauge.get(&entity(), &fields()), Some(true));
    }

    #[test]
    fn test_set_and_get_float() {
        let gauge = Gauge::<f64>::new("/gauge/test/d", MetricConfig::default());
        gauge.set_at(3.5, &entity(), &fields(), SystemTime::UNIX_EPOCH);
        assert_eq!(gauge.get(&entity(), &fields()), Some(3.5));
    }

    #[test]
    fn test_set_and_get_string() {
        let gauge = Gauge::<String>::new("/gauge/test/e", MetricConfig::default());
        gauge.set_at("hi".to_string(), &entity(), &fields(), SystemTime::UNIX_EPOCH);
        assert_eq!(gauge.get(&entity(), &fields()), Some("hi".to_string()));
    }

    #[test]
    fn test_set_overwrites() {
        let gauge = Gauge::<i64>::new("/gauge/test/f", MetricConfig::default());
        gauge.set_at(1, &entity(), &fields(), SystemTime::UNIX_EPOCH);
        gauge.set_at(2, &entity(), &fields(), SystemTime::UNIX_EPOCH);
        assert_eq!(gauge.get(&entity(), &fields()), Some(2));
    }

    #[test]
    fn test_delete() {
        let gauge = Gauge::<i64>::new("/gauge/test/g", MetricConfig::default());
        gauge.set_at(1, &entity(), &fields(), SystemTime::UNIX_EPOCH);
        assert!(gauge.delete(&entity(), &fields()));
        assert!(gauge.get(&entity(), &fields()).is_none());
    }

    #[test]
    fn test_clear_removes_every_cell_on_entity() {
        let gauge = Gauge::<i64>::new("/gauge/test/h", MetricConfig::default());
        let other_fields = FieldMap::from([("k", FieldValue::Int(2))]);
        gauge.set_at(1, &entity(), &fields(), SystemTime::UNIX_EPOCH);
        gauge.set_at(2, &entity(), &other_fields, SystemTime::UNIX_EPOCH);
        assert!(gauge.clear(&entity()));
        assert!(gauge.get(&entity(), &fields()).is_none());
        assert!(gauge.get(&entity(), &other_fields).is_none());
    }
}
