use super::payload::Payload;
use super::{resolve_tenant, PublisherDeps, Signal};
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::{pub_sub, EventConsumer, EventPublisher};
use crate::publisher::remote::RemoteClientError;
use crate::publisher::Publisher;
use crate::tenant::RemoteDatasource;
use crate::utils::backoff::Backoff;
use std::sync::Mutex;
use tracing::warn;

/// Synchronous publisher variant for constrained deployments: no per-tenant
/// queues or worker threads, deliveries happen on the caller's thread with
/// the same retry policy. Same delivery contract as the queued variant; the
/// caller (the scraper) absorbs the latency, which its overlap-skip already
/// tolerates.
pub struct InlinePublisher {
    deps: PublisherDeps,
    stop_publisher: Mutex<Option<EventPublisher<CancellationMessage>>>,
    stop_consumer: EventConsumer<CancellationMessage>,
}

impl InlinePublisher {
    pub fn new(deps: PublisherDeps) -> Self {
        let (stop_publisher, stop_consumer) = pub_sub();
        Self {
            deps,
            stop_publisher: Mutex::new(Some(stop_publisher)),
            stop_consumer,
        }
    }

    fn deliver<F>(&self, signal: Signal, mut send: F)
    where
        F: FnMut() -> Result<(), RemoteClientError>,
    {
        let retry = &self.deps.retry;
        let mut backoff = Backoff::new(retry.min_delay, retry.max_delay, retry.steps);
        for attempt in 1..=retry.max_attempts {
            match send() {
                Ok(()) => {
                    self.deps
                        .metrics
                        .pushed_total
                        .with_label_values(&[signal.as_str()])
                        .inc();
                    return;
                }
                Err(err) if err.is_retryable() && attempt < retry.max_attempts => {
                    self.deps
                        .metrics
                        .retries_total
                        .with_label_values(&[signal.as_str()])
                        .inc();
                    if self.stop_consumer.is_cancelled(backoff.next_delay()) {
                        self.deps.metrics.drop_batch(signal, "shutdown");
                        return;
                    }
                }
                Err(err) if err.is_retryable() => {
                    warn!(%signal, error = %err, "delivery retries exhausted, dropping batch");
                    self.deps.metrics.drop_batch(signal, "retry_exhausted");
                    return;
                }
                Err(err) => {
                    warn!(%signal, error = %err, "permanent delivery failure, dropping batch");
                    self.deps.metrics.drop_batch(signal, "permanent_error");
                    return;
                }
            }
        }
    }

    fn send_metrics(&self, remote: &RemoteDatasource, payload: &Payload) {
        self.deliver(Signal::Metrics, || {
            self.deps.client.send_metrics(remote, &payload.time_series)
        });
    }

    fn send_logs(&self, remote: &RemoteDatasource, payload: &Payload) {
        self.deliver(Signal::Logs, || {
            self.deps.client.send_logs(remote, &payload.streams)
        });
    }
}

impl Publisher for InlinePublisher {
    fn publish(&self, payload: Payload) {
        let Some(tenant) = resolve_tenant(&self.deps.tenant_cache, &payload, &self.deps.metrics)
        else {
            return;
        };

        let mut payload = payload;
        if tenant.omit_label_prefix {
            payload.strip_user_label_prefix();
        }

        if !payload.time_series.is_empty() {
            match &tenant.metrics_remote {
                Some(remote) => self.send_metrics(remote, &payload),
                None => self.deps.metrics.drop_batch(Signal::Metrics, "no_remote"),
            }
        }
        if !payload.streams.is_empty() {
            match &tenant.logs_remote {
                Some(remote) => self.send_logs(remote, &payload),
                None => self.deps.metrics.drop_batch(Signal::Logs, "no_remote"),
            }
        }
    }

    fn stop(&self) {
        // Dropping the publisher side wakes any in-flight backoff sleep.
        self.stop_publisher
            .lock()
            .expect("publisher stop lock poisoned")
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::model::Label;
    use crate::publisher::payload::{Sample, TimeSeries};
    use crate::publisher::remote::tests::MockRemoteClient;
    use crate::publisher::{PublisherMetrics, RetryConfig};
    use crate::tenant::cache::TenantCache;
    use crate::tenant::tests::{routable_tenant, MockTenantProvider};
    use prometheus::Registry;
    use std::sync::Arc;
    use std::time::Duration;

    fn deps_with(client: MockRemoteClient) -> PublisherDeps {
        let mut provider = MockTenantProvider::new();
        provider
            .expect_get_tenant()
            .returning(|id, _| Ok(routable_tenant(id, 1.0)));
        PublisherDeps {
            tenant_cache: Arc::new(TenantCache::new(
                Arc::new(provider),
                Duration::from_secs(60),
            )),
            client: Arc::new(client),
            metrics: PublisherMetrics::new(&Registry::new()),
            retry: RetryConfig {
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                steps: 3,
                max_attempts: 3,
            },
        }
    }

    fn payload() -> Payload {
        Payload {
            tenant_id: 1,
            time_series: vec![TimeSeries {
                labels: vec![Label::new("__name__", "probe_success")],
                samples: vec![Sample {
                    timestamp_ms: 0,
                    value: 1.0,
                }],
            }],
            streams: vec![],
        }
    }

    #[test]
    fn delivers_synchronously() {
        let mut client = MockRemoteClient::new();
        client.expect_send_metrics().times(1).returning(|_, _| Ok(()));

        let deps = deps_with(client);
        let metrics = deps.metrics.clone();
        let publisher = InlinePublisher::new(deps);
        publisher.publish(payload());

        assert_eq!(
            metrics.pushed_total.with_label_values(&["metrics"]).get(),
            1
        );
    }

    #[test]
    fn retries_then_drops_on_exhaustion() {
        let mut client = MockRemoteClient::new();
        client
            .expect_send_metrics()
            .times(3)
            .returning(|_, _| Err(RemoteClientError::Transport("down".to_string())));

        let deps = deps_with(client);
        let metrics = deps.metrics.clone();
        let publisher = InlinePublisher::new(deps);
        publisher.publish(payload());

        assert_eq!(
            metrics
                .dropped_total
                .with_label_values(&["metrics", "retry_exhausted"])
                .get(),
            1
        );
    }
}
