use crate::publisher::payload::Payload;
use crate::publisher::remote::RemoteClient;
use crate::tenant::cache::TenantCache;
use crate::tenant::Tenant;
use prometheus::{register_int_counter_vec_with_registry, IntCounterVec, Registry};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub mod inline;
pub mod payload;
pub mod queued;
pub mod remote;

/// How long a publish is willing to wait for a tenant lookup before dropping
/// the scrape's output.
const TENANT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_PUBLISHER: &str = "queued";

/// Delivery contract: at-least-once delivery of each sample to at most one
/// remote per signal per tenant; no re-ordering within a scrape, re-ordering
/// across scrapes allowed.
pub trait Publisher: Send + Sync {
    fn publish(&self, payload: Payload);

    /// Drains in-flight work subject to a bounded grace period, then drops
    /// the rest. Idempotent.
    fn stop(&self);
}

/// The two signals a scrape produces, each routed to its own tenant remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Metrics,
    Logs,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Logs => "logs",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry policy for outbound deliveries. The defaults walk the backoff from
/// 2s to its 30s cap; tests shrink them.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub steps: u32,
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            steps: 8,
            max_attempts: 9,
        }
    }
}

#[derive(Clone)]
pub struct PublisherMetrics {
    pub(crate) pushed_total: IntCounterVec,
    pub(crate) dropped_total: IntCounterVec,
    pub(crate) retries_total: IntCounterVec,
}

impl PublisherMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            pushed_total: register_int_counter_vec_with_registry!(
                "sm_agent_publisher_pushed_total",
                "Batches delivered to tenant remotes.",
                &["signal"],
                registry
            )
            .expect("metric registration should not fail"),
            dropped_total: register_int_counter_vec_with_registry!(
                "sm_agent_publisher_dropped_total",
                "Batches dropped before delivery.",
                &["signal", "reason"],
                registry
            )
            .expect("metric registration should not fail"),
            retries_total: register_int_counter_vec_with_registry!(
                "sm_agent_publisher_retries_total",
                "Delivery retries.",
                &["signal"],
                registry
            )
            .expect("metric registration should not fail"),
        }
    }

    pub(crate) fn drop_batch(&self, signal: Signal, reason: &str) {
        self.dropped_total
            .with_label_values(&[signal.as_str(), reason])
            .inc();
    }
}

/// Everything a publisher variant needs; handed to the factory selected from
/// the registry.
#[derive(Clone)]
pub struct PublisherDeps {
    pub tenant_cache: Arc<TenantCache>,
    pub client: Arc<dyn RemoteClient>,
    pub metrics: PublisherMetrics,
    pub retry: RetryConfig,
}

pub type PublisherFactory = fn(PublisherDeps) -> Arc<dyn Publisher>;

#[derive(Debug, Error)]
#[error("unknown publisher `{0}`")]
pub struct UnknownPublisherError(String);

/// By-name registry of publisher variants, selected once at startup.
pub struct PublisherRegistry {
    factories: HashMap<&'static str, PublisherFactory>,
}

fn build_queued(deps: PublisherDeps) -> Arc<dyn Publisher> {
    Arc::new(queued::QueuedPublisher::new(deps))
}

fn build_inline(deps: PublisherDeps) -> Arc<dyn Publisher> {
    Arc::new(inline::InlinePublisher::new(deps))
}

impl PublisherRegistry {
    pub fn with_defaults() -> Self {
        let mut factories: HashMap<&'static str, PublisherFactory> = HashMap::new();
        factories.insert(DEFAULT_PUBLISHER, build_queued as PublisherFactory);
        factories.insert("inline", build_inline as PublisherFactory);
        Self { factories }
    }

    pub fn build(
        &self,
        name: &str,
        deps: PublisherDeps,
    ) -> Result<Arc<dyn Publisher>, UnknownPublisherError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| UnknownPublisherError(name.to_string()))?;
        Ok(factory(deps))
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Resolves the tenant for a payload, or drops it with a counted warning:
/// without routing information the data cannot go anywhere.
pub(crate) fn resolve_tenant(
    cache: &TenantCache,
    payload: &Payload,
    metrics: &PublisherMetrics,
) -> Option<Tenant> {
    match cache.get(payload.tenant_id, TENANT_RESOLVE_TIMEOUT) {
        Ok(tenant) => Some(tenant),
        Err(err) => {
            warn!(tenant_id = payload.tenant_id, error = %err, "dropping unroutable payload");
            if !payload.time_series.is_empty() {
                metrics.drop_batch(Signal::Metrics, "tenant_unresolved");
            }
            if !payload.streams.is_empty() {
                metrics.drop_batch(Signal::Logs, "tenant_unresolved");
            }
            None
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub Publisher {}

        impl Publisher for Publisher {
            fn publish(&self, payload: Payload);
            fn stop(&self);
        }
    }

    /// A publisher handing every payload to the test thread.
    pub struct ChannelPublisher(pub std::sync::mpsc::Sender<Payload>);

    impl Publisher for ChannelPublisher {
        fn publish(&self, payload: Payload) {
            let _ = self.0.send(payload);
        }

        fn stop(&self) {}
    }

    #[test]
    fn registry_knows_both_variants() {
        let registry = PublisherRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["inline", "queued"]);
    }

    #[test]
    fn registry_rejects_unknown_name() {
        use crate::publisher::remote::tests::MockRemoteClient;
        use crate::tenant::tests::MockTenantProvider;

        let registry = PublisherRegistry::with_defaults();
        let deps = PublisherDeps {
            tenant_cache: Arc::new(TenantCache::new(
                Arc::new(MockTenantProvider::new()),
                Duration::from_secs(60),
            )),
            client: Arc::new(MockRemoteClient::new()),
            metrics: PublisherMetrics::new(&Registry::new()),
            retry: RetryConfig::default(),
        };
        assert!(registry.build("bogus", deps).is_err());
    }
}
