use crate::bucketer::{Bucketer, BucketerRef};
use crate::error::{Result, TszError};
use std::time::Duration;

/// Per-metric configuration, fixed at declaration time via `Shard::define_metric`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricConfig {
    /// If true, values accumulate across writes rather than being overwritten by each write
    /// (only meaningful for integer and distribution metrics).
    pub cumulative: bool,
    /// If true, cells whose value hasn't changed since the last read may be omitted from an
    /// export pass. Accepted and stored for forward compatibility with an exporting backend; no
    /// such backend exists in this crate, so it has no observable effect here.
    pub skip_stable_cells: bool,
    /// If true, reads report the delta since the previous read rather than the absolute value.
    /// Like `skip_stable_cells`, this is inert without a backend that samples on a fixed period.
    pub delta_mode: bool,
    /// If true, writers may supply their own timestamp instead of the wall-clock time of the
    /// write.
    pub user_timestamps: bool,
    /// The bucketing scheme for distribution-valued metrics. Ignored for other value types.
    pub bucketer: Option<BucketerRef>,
    pub max_entity_staleness: Option<Duration>,
    pub max_value_staleness: Option<Duration>,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
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

impl MetricConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cumulative(mut self, cumulative: bool) -> Self {
        self.cumulative = cumulative;
        self
    }

    pub fn set_skip_stable_cells(mut self, skip_stable_cells: bool) -> Self {
        self.skip_stable_cells = skip_stable_cells;
        self
    }

    pub fn set_delta_mode(mut self, delta_mode: bool) -> Self {
        self.delta_mode = delta_mode;
        self
    }

    pub fn set_user_timestamps(mut self, user_timestamps: bool) -> Self {
        self.user_timestamps = user_timestamps;
        self
    }

    pub fn set_bucketer(mut self, bucketer: &'static Bucketer) -> Self {
        self.bucketer = Some(BucketerRef::from(bucketer));
        self
    }

    pub fn clear_bucketer(mut self) -> Self {
        self.bucketer = None;
        self
    }

    pub fn set_max_entity_staleness(mut self, duration: Duration) -> Self {
        self.max_entity_staleness = Some(duration);
        self
    }

    pub fn set_max_value_staleness(mut self, duration: Duration) -> Self {
        self.max_value_staleness = Some(duration);
        self
    }

    /// The bucketer distribution cells should use: the configured one, or the process-wide
    /// default.
    pub fn bucketer_or_default(&self) -> &'static Bucketer {
        self.bucketer.map(|b| b.bucketer).unwrap_or_else(Bucketer::default_bucketer)
    }
}

/// Validates a metric name against `(/[A-Za-z0-9._-]+)+`: one or more `/`-prefixed, non-empty
/// segments drawn from letters, digits, `.`, `_`, and `-`.
pub fn validate_metric_name(name: &str) -> Result<()> {
    let bytes = name.as_bytes();
    if bytes.is_empty() {
        return Err(TszError::InvalidArgument("metric name must not be empty".to_string()));
    }
    let mut i = 0;
    let mut segments = 0;
    while i < bytes.len() {
        if bytes[i] != b'/' {
            return Err(TszError::InvalidArgument(format!(
                "metric name {name:?} must consist of '/'-separated segments"
            )));
        }
        i += 1;
        let segment_start = i;
        while i < bytes.len() && is_segment_char(bytes[i]) {
            i += 1;
        }
        if i == segment_start {
            return Err(TszError::InvalidArgument(format!(
                "metric name {name:?} has an empty path segment"
            )));
        }
        segments += 1;
    }
    if segments == 0 {
        return Err(TszError::InvalidArgument(format!(
            "metric name {name:?} must have at least one path segment"
        )));
    }
    Ok(())
}

fn is_segment_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_metric_name("/foo").is_ok());
        assert!(validate_metric_name("/foo/bar").is_ok());
        assert!(validate_metric_name("/foo.bar/baz-quux_1").is_ok());
    }

    #[test]
    fn test_missing_leading_slash() {
        assert!(validate_metric_name("foo").is_err());
    }

    #[test]
    fn test_empty_segment() {
        assert!(validate_metric_name("/foo//bar").is_err());
        assert!(validate_metric_name("/").is_err());
    }

    #[test]
    fn test_empty_name() {
        assert!(validate_metric_name("").is_err());
    }

    #[test]
    fn test_invalid_character() {
        assert!(validate_metric_name("/foo bar").is_err());
        assert!(validate_metric_name("/foo:bar").is_err());
    }

    #[test]
    fn test_builder() {
        let config = MetricConfig::new().set_cumulative(true).set_user_timestamps(true);
        assert!(config.cumulative);
        assert!(config.user_timestamps);
        assert!(!config.delta_mode);
    }

    #[test]
    fn test_bucketer_or_default_falls_back() {
        let config = MetricConfig::new();
        assert!(std::ptr::eq(config.bucketer_or_default(), Bucketer::default_bucketer()));
    }
}
