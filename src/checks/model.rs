use super::id;
use super::settings::CheckSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A label attached to a check or a time series.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The check type, derived from which settings variant is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckType {
    Dns,
    Http,
    Ping,
    Tcp,
    Traceroute,
    Scripted,
    MultiHttp,
    Grpc,
    Browser,
}

impl CheckType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dns => "dns",
            Self::Http => "http",
            Self::Ping => "ping",
            Self::Tcp => "tcp",
            Self::Traceroute => "traceroute",
            Self::Scripted => "scripted",
            Self::MultiHttp => "multihttp",
            Self::Grpc => "grpc",
            Self::Browser => "browser",
        }
    }

    pub fn class(self) -> CheckClass {
        match self {
            Self::Scripted | Self::MultiHttp => CheckClass::Scripted,
            Self::Browser => CheckClass::Browser,
            _ => CheckClass::Protocol,
        }
    }

    /// The smallest permitted scrape interval for this type. Heavier checks
    /// (script runners, traceroute) get coarser floors.
    pub fn min_frequency(self) -> Duration {
        match self {
            Self::Traceroute => Duration::from_secs(120),
            Self::Scripted | Self::MultiHttp | Self::Browser => Duration::from_secs(60),
            _ => Duration::from_secs(1),
        }
    }

    /// The largest permitted per-run timeout for this type.
    pub fn max_timeout(self) -> Duration {
        match self {
            Self::Scripted | Self::MultiHttp | Self::Browser => Duration::from_secs(180),
            _ => Duration::from_secs(10),
        }
    }

    pub const MAX_FREQUENCY: Duration = Duration::from_secs(3600);
    pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing/telemetry class of a check type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckClass {
    Protocol,
    Scripted,
    Browser,
}

impl CheckClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Scripted => "scripted",
            Self::Browser => "browser",
        }
    }
}

impl fmt::Display for CheckClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of work: a versioned instruction telling this probe to measure
/// `target` every `frequency` milliseconds on behalf of `tenant_id`.
///
/// Checks are immutable once created; the control plane replaces them
/// wholesale via update events, compared by `modified`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub tenant_id: i64,
    /// Scrape interval in milliseconds.
    #[serde(default)]
    pub frequency: i64,
    /// First-tick spreading offset in milliseconds.
    #[serde(default)]
    pub offset: i64,
    /// Per-run deadline in milliseconds.
    #[serde(default)]
    pub timeout: i64,
    /// Probe ids permitted to run this check.
    #[serde(default)]
    pub probes: Vec<i64>,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub job: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub settings: CheckSettings,
    /// Version stamp, seconds since epoch with fractional nanos. Higher wins.
    #[serde(default)]
    pub modified: f64,
}

impl Check {
    pub fn check_type(&self) -> CheckType {
        self.settings.check_type()
    }

    pub fn class(&self) -> CheckClass {
        self.check_type().class()
    }

    pub fn frequency(&self) -> Duration {
        crate::utils::time::millis(self.frequency)
    }

    pub fn timeout(&self) -> Duration {
        crate::utils::time::millis(self.timeout)
    }

    /// The region this check belongs to, when its tenant id is global.
    pub fn region_id(&self) -> Option<i32> {
        id::global_to_local(self.tenant_id)
            .map(|(_, region)| region)
            .ok()
    }

    /// The region-local part of the tenant id, or the tenant id itself when
    /// it is already local.
    pub fn local_tenant_id(&self) -> i64 {
        id::global_to_local(self.tenant_id)
            .map(|(local, _)| local)
            .unwrap_or(self.tenant_id)
    }

    /// Whether replacing `self` with `update` changes anything that affects
    /// the scrape schedule or execution, requiring the scraper to be
    /// recreated rather than patched in place.
    pub fn schedule_changed_by(&self, update: &Check) -> bool {
        self.frequency != update.frequency
            || self.offset != update.offset
            || self.timeout != update.timeout
            || self.target != update.target
            || self.settings != update.settings
            || self.probes != update.probes
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::checks::settings::{HttpSettings, PingSettings};

    /// A minimal valid ping check, reused by tests across the crate.
    pub fn ping_check(id: i64, tenant_id: i64) -> Check {
        Check {
            id,
            tenant_id,
            frequency: 1000,
            offset: 0,
            timeout: 1000,
            probes: vec![1],
            target: "127.0.0.1".to_string(),
            job: "test-job".to_string(),
            labels: Vec::new(),
            settings: CheckSettings::Ping(PingSettings::default()),
            modified: 1.0,
        }
    }

    /// A minimal valid http check.
    pub fn http_check(id: i64, tenant_id: i64) -> Check {
        Check {
            target: "https://example.org/".to_string(),
            frequency: 10_000,
            timeout: 2_500,
            settings: CheckSettings::Http(HttpSettings::default()),
            ..ping_check(id, tenant_id)
        }
    }

    #[test]
    fn type_and_class_derive_from_settings() {
        let check = ping_check(1, 1);
        assert_eq!(check.check_type(), CheckType::Ping);
        assert_eq!(check.class(), CheckClass::Protocol);

        let check = http_check(1, 1);
        assert_eq!(check.check_type(), CheckType::Http);
    }

    #[test]
    fn schedule_change_detection() {
        let base = ping_check(1, 1);

        let mut update = base.clone();
        update.labels = vec![Label::new("env", "prod")];
        assert!(!base.schedule_changed_by(&update));

        let mut update = base.clone();
        update.frequency = 2000;
        assert!(base.schedule_changed_by(&update));

        let mut update = base.clone();
        update.target = "192.0.2.1".to_string();
        assert!(base.schedule_changed_by(&update));

        let mut update = base.clone();
        update.settings = CheckSettings::Ping(PingSettings {
            payload_size: 64,
            ..Default::default()
        });
        assert!(base.schedule_changed_by(&update));
    }

    #[test]
    fn region_from_global_tenant() {
        let tenant_id = crate::checks::id::local_to_global(7, 3).unwrap();
        let check = ping_check(1, tenant_id);
        assert_eq!(check.region_id(), Some(3));
        assert_eq!(check.local_tenant_id(), 7);
    }

    #[test]
    fn json_settings_are_externally_tagged() {
        let check = ping_check(1, 1);
        let json = serde_json::to_string(&check).unwrap();
        assert!(json.contains("\"settings\":{\"ping\":"));
        let back: Check = serde_json::from_str(&json).unwrap();
        assert_eq!(back, check);
    }
}
