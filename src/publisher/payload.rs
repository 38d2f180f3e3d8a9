use crate::checks::model::Label;
use serde::Serialize;

/// Prefix applied to user-defined check labels on emitted series, so they
/// cannot collide with the agent's own label names. Tenants may opt out.
pub const USER_LABEL_PREFIX: &str = "label_";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TimeSeries {
    pub labels: Vec<Label>,
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    /// The metric name, carried as the `__name__` label.
    pub fn name(&self) -> Option<&str> {
        self.labels
            .iter()
            .find(|label| label.name == "__name__")
            .map(|label| label.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp_ns: i64,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LogStream {
    pub labels: Vec<Label>,
    pub entries: Vec<LogEntry>,
}

/// Everything one scrape produced, routed as a unit: the series of a scrape
/// are delivered in one call and never interleaved with another scrape of the
/// same check.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payload {
    /// Global tenant id owning the check that produced this data.
    pub tenant_id: i64,
    pub time_series: Vec<TimeSeries>,
    pub streams: Vec<LogStream>,
}

impl Payload {
    /// Removes the [`USER_LABEL_PREFIX`] from series labels, for tenants that
    /// asked for unprefixed label names.
    pub fn strip_user_label_prefix(&mut self) {
        for series in &mut self.time_series {
            for label in &mut series.labels {
                if let Some(stripped) = label.name.strip_prefix(USER_LABEL_PREFIX) {
                    label.name = stripped.to_string();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_user_label_prefix_only_touches_prefixed() {
        let mut payload = Payload {
            tenant_id: 1,
            time_series: vec![TimeSeries {
                labels: vec![
                    Label::new("__name__", "probe_success"),
                    Label::new("label_env", "prod"),
                    Label::new("job", "uptime"),
                ],
                samples: vec![],
            }],
            streams: vec![],
        };
        payload.strip_user_label_prefix();
        assert_eq!(
            payload.time_series[0].labels,
            vec![
                Label::new("__name__", "probe_success"),
                Label::new("env", "prod"),
                Label::new("job", "uptime"),
            ]
        );
    }

    #[test]
    fn series_name_lookup() {
        let series = TimeSeries {
            labels: vec![Label::new("__name__", "probe_success")],
            samples: vec![],
        };
        assert_eq!(series.name(), Some("probe_success"));
        assert_eq!(TimeSeries::default().name(), None);
    }
}
