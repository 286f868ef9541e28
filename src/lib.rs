//! tsz: an in-process time-series telemetry runtime.
//!
//! A process registers metrics once (`Exporter::define_metric` or the typed [`Gauge`],
//! [`Counter`], and [`EventMetric`] wrappers), then writes to them keyed by an entity (e.g. a
//! process or host, identified by a [`FieldMap`] of labels) and a metric-field [`FieldMap`] of
//! its own. Metric declarations and the realm/shard routing built on top of them are served by a
//! lock-free, read-optimized hash map ([`lock_free_map`]); entities and metrics within a shard
//! are reference-counted by pin, so a handle taken out mid-write keeps its target alive even if
//! every writer using it is racing a concurrent auto-collection.
//!
//! [`cell_reader`] is the test-only surface for reading back whatever a test just wrote.

pub mod bucketer;
pub mod cell;
pub mod cell_reader;
pub mod clock;
pub mod config;
pub mod context;
pub mod counter;
pub mod distribution;
pub mod entity;
pub mod error;
pub mod event_metric;
pub mod exporter;
pub mod field;
pub mod gauge;
pub mod lock_free_map;
pub mod metric;
pub mod shard;
pub mod utils;
pub mod value;

pub use bucketer::{Bucketer, BucketerRef};
pub use cell_reader::CellReader;
pub use clock::{Clock, RealClock};
pub use config::MetricConfig;
pub use counter::Counter;
pub use distribution::Distribution;
pub use error::{Result, TszError};
pub use event_metric::EventMetric;
pub use exporter::{EXPORTER, Exporter, Options};
pub use field::{FieldMap, FieldValue};
pub use gauge::{Gauge, GaugeValue};
pub use shard::Shard;
pub use value::Value;
