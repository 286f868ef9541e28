//! A testing-only tool to read arbitrary tsz cells without standing up a real scrape path.
//!
//! Unlike the rest of this crate, `CellReader` is meant to be instantiated directly inside test
//! code (typically as a function-local or a `#[cfg(test)]` fixture), bound to one metric name for
//! its whole lifetime. The source this crate is modeled on encodes the entity label and metric
//! field schemas as extra template parameters so that `Read`/`Delta` take positional, typed
//! arguments; this crate's `FieldMap` is already the dynamically-typed argument those schemas
//! build internally, so a `CellReader` here just takes `FieldMap`s directly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Result, TszError};
use crate::exporter::EXPORTER;
use crate::field::FieldMap;
use crate::shard::Shard;
use crate::value::Value;

/// Construction options for a `CellReader`.
#[derive(Debug, Clone)]
pub struct Options {
    /// Deletes every cell of the bound metric, across all entities, when the reader is dropped.
    ///
    /// Cells are global state shared by every test in a process; leaving this on (the default)
    /// keeps one test's writes from leaking into the next.
    pub clear_metric_on_destruction: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { clear_metric_on_destruction: true }
    }
}

/// Reads (and, for integer metrics, diffs) the cells of a single metric by name.
///
/// This class is thread-safe. Example usage:
///
/// ```ignore
/// let reader = CellReader::new("/foo/bar/count");
/// let count = reader.read(&entity_labels, &metric_fields)?;
/// ```
pub struct CellReader {
    metric_name: String,
    options: Options,
    snapshots: Mutex<HashMap<(FieldMap, FieldMap), i64>>,
}

impl CellReader {
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self::with_options(metric_name, Options::default())
    }

    pub fn with_options(metric_name: impl Into<String>, options: Options) -> Self {
        Self { metric_name: metric_name.into(), options, snapshots: Mutex::new(HashMap::new()) }
    }

    fn shard(&self) -> Option<Arc<Shard>> {
        EXPORTER.get_shard_for_metric(&self.metric_name).ok()
    }

    /// Reads the cell identified by `entity_labels` and `metric_fields`, or an error if the
    /// metric is undeclared or the cell doesn't exist.
    pub fn read(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> Result<Value> {
        let shard = self.shard().ok_or_else(|| {
            TszError::FailedPrecondition(format!(
                "the metric {:?} is not defined",
                self.metric_name
            ))
        })?;
        shard.get_value(entity_labels, &self.metric_name, metric_fields)
    }

    /// For integer-valued metrics only: the difference between the current reading and the
    /// previous reading taken through this same reader for this key, or the full value if this
    /// is the first read of that key.
    pub fn delta(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> Result<i64> {
        let current = self.read(entity_labels, metric_fields)?.as_int().ok_or_else(|| {
            TszError::InvalidArgument(format!("metric {:?} is not integer-valued", self.metric_name))
        })?;
        let key = (entity_labels.clone(), metric_fields.clone());
        let mut snapshots = self.snapshots.lock().unwrap();
        let previous = snapshots.insert(key, current).unwrap_or(0);
        Ok(current - previous)
    }

    /// `delta`, treating any read error (e.g. the cell not existing yet) as a delta of zero.
    pub fn delta_or_zero(&self, entity_labels: &FieldMap, metric_fields: &FieldMap) -> i64 {
        self.delta(entity_labels, metric_fields).unwrap_or(0)
    }
}

impl Drop for CellReader {
    fn drop(&mut self) {
        if self.options.clear_metric_on_destruction {
            if let Some(shard) = self.shard() {
                shard.delete_metric(&self.metric_name);
            }
        }
    }
}
