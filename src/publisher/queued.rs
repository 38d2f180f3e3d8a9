use super::payload::{LogStream, Payload, TimeSeries};
use super::remote::RemoteClient;
use super::{resolve_tenant, PublisherDeps, PublisherMetrics, RetryConfig, Signal};
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::{pub_sub, EventConsumer, EventPublisher};
use crate::publisher::Publisher;
use crate::tenant::RemoteDatasource;
use crate::utils::backoff::Backoff;
use crate::utils::threads::spawn_named_thread;
use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::select;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const QUEUE_CAPACITY: usize = 128;

/// How long a stopping worker keeps delivering queued batches before dropping
/// the remainder.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum Batch {
    Metrics(Vec<TimeSeries>),
    Logs(Vec<LogStream>),
}

impl Batch {
    fn signal(&self) -> Signal {
        match self {
            Self::Metrics(_) => Signal::Metrics,
            Self::Logs(_) => Signal::Logs,
        }
    }
}

#[derive(Debug)]
struct WorkItem {
    remote: RemoteDatasource,
    batch: Batch,
}

struct Worker {
    sender: Sender<WorkItem>,
    stop_publisher: EventPublisher<CancellationMessage>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(
        tenant_id: i64,
        signal: Signal,
        client: Arc<dyn RemoteClient>,
        retry: RetryConfig,
        metrics: PublisherMetrics,
    ) -> Self {
        let (sender, receiver) = bounded(QUEUE_CAPACITY);
        let (stop_publisher, stop_consumer) = pub_sub();
        let handle = spawn_named_thread(
            format!("publisher-{signal}-{tenant_id}"),
            move || run_worker(receiver, stop_consumer, client, retry, metrics),
        );
        Self {
            sender,
            stop_publisher,
            handle,
        }
    }

    fn stop(self) {
        let _ = self.stop_publisher.publish(());
        drop(self.stop_publisher);
        drop(self.sender);
        if self.handle.join().is_err() {
            warn!("publisher worker thread panicked");
        }
    }
}

fn run_worker(
    items: Receiver<WorkItem>,
    stop_consumer: EventConsumer<CancellationMessage>,
    client: Arc<dyn RemoteClient>,
    retry: RetryConfig,
    metrics: PublisherMetrics,
) {
    loop {
        select! {
            recv(items) -> item => match item {
                Ok(item) => deliver(item, client.as_ref(), &retry, &stop_consumer, &metrics),
                Err(_) => return,
            },
            recv(stop_consumer.as_ref()) -> _ => {
                drain(&items, client.as_ref(), &metrics);
                return;
            },
        }
    }
}

/// Delivers one batch with bounded, jittered-exponential retries. Retryable
/// failures back off until the attempt budget runs out; permanent failures
/// and cancellation drop immediately, with a counted reason.
fn deliver(
    item: WorkItem,
    client: &dyn RemoteClient,
    retry: &RetryConfig,
    stop_consumer: &EventConsumer<CancellationMessage>,
    metrics: &PublisherMetrics,
) {
    let signal = item.batch.signal();
    let mut backoff = Backoff::new(retry.min_delay, retry.max_delay, retry.steps);

    for attempt in 1..=retry.max_attempts {
        let result = match &item.batch {
            Batch::Metrics(series) => client.send_metrics(&item.remote, series),
            Batch::Logs(streams) => client.send_logs(&item.remote, streams),
        };
        match result {
            Ok(()) => {
                metrics
                    .pushed_total
                    .with_label_values(&[signal.as_str()])
                    .inc();
                return;
            }
            Err(err) if err.is_retryable() && attempt < retry.max_attempts => {
                debug!(%signal, attempt, error = %err, "delivery failed, backing off");
                metrics
                    .retries_total
                    .with_label_values(&[signal.as_str()])
                    .inc();
                if stop_consumer.is_cancelled(backoff.next_delay()) {
                    metrics.drop_batch(signal, "shutdown");
                    return;
                }
            }
            Err(err) if err.is_retryable() => {
                warn!(%signal, error = %err, "delivery retries exhausted, dropping batch");
                metrics.drop_batch(signal, "retry_exhausted");
                return;
            }
            Err(err) => {
                warn!(%signal, error = %err, "permanent delivery failure, dropping batch");
                metrics.drop_batch(signal, "permanent_error");
                return;
            }
        }
    }
}

/// Best-effort drain on shutdown: one delivery attempt per queued batch until
/// the grace period runs out, then count the rest as dropped.
fn drain(items: &Receiver<WorkItem>, client: &dyn RemoteClient, metrics: &PublisherMetrics) {
    let deadline = Instant::now() + DRAIN_GRACE;
    while let Ok(item) = items.try_recv() {
        let signal = item.batch.signal();
        if Instant::now() >= deadline {
            metrics.drop_batch(signal, "shutdown");
            continue;
        }
        let result = match &item.batch {
            Batch::Metrics(series) => client.send_metrics(&item.remote, series),
            Batch::Logs(streams) => client.send_logs(&item.remote, streams),
        };
        match result {
            Ok(()) => metrics
                .pushed_total
                .with_label_values(&[signal.as_str()])
                .inc(),
            Err(_) => metrics.drop_batch(signal, "shutdown"),
        }
    }
}

/// The default publisher: one outbound queue and worker thread per
/// (tenant, signal), created lazily. A slow remote only ever stalls its own
/// tenant's queue.
pub struct QueuedPublisher {
    deps: PublisherDeps,
    workers: Mutex<HashMap<(i64, Signal), Worker>>,
}

impl QueuedPublisher {
    pub fn new(deps: PublisherDeps) -> Self {
        Self {
            deps,
            workers: Mutex::new(HashMap::new()),
        }
    }

    fn enqueue(&self, tenant_id: i64, remote: RemoteDatasource, batch: Batch) {
        let signal = batch.signal();
        let mut workers = self.workers.lock().expect("publisher worker map poisoned");
        let worker = workers.entry((tenant_id, signal)).or_insert_with(|| {
            Worker::spawn(
                tenant_id,
                signal,
                Arc::clone(&self.deps.client),
                self.deps.retry.clone(),
                self.deps.metrics.clone(),
            )
        });
        if worker.sender.try_send(WorkItem { remote, batch }).is_err() {
            warn!(tenant_id, %signal, "outbound queue full, dropping batch");
            self.deps.metrics.drop_batch(signal, "queue_full");
        }
    }
}

impl Publisher for QueuedPublisher {
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
            match tenant.metrics_remote {
                Some(remote) => {
                    self.enqueue(payload.tenant_id, remote, Batch::Metrics(payload.time_series))
                }
                None => self.deps.metrics.drop_batch(Signal::Metrics, "no_remote"),
            }
        }
        if !payload.streams.is_empty() {
            match tenant.logs_remote {
                Some(remote) => {
                    self.enqueue(payload.tenant_id, remote, Batch::Logs(payload.streams))
                }
                None => self.deps.metrics.drop_batch(Signal::Logs, "no_remote"),
            }
        }
    }

    fn stop(&self) {
        let workers: Vec<Worker> = {
            let mut workers = self.workers.lock().expect("publisher worker map poisoned");
            workers.drain().map(|(_, worker)| worker).collect()
        };
        for worker in workers {
            worker.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::payload::Sample;
    use crate::publisher::remote::tests::MockRemoteClient;
    use crate::publisher::remote::RemoteClientError;
    use crate::tenant::cache::TenantCache;
    use crate::tenant::tests::{routable_tenant, MockTenantProvider};
    use crate::tenant::TenantProviderError;
    use crate::checks::model::Label;
    use prometheus::Registry;
    use std::sync::mpsc;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            steps: 3,
            max_attempts: 3,
        }
    }

    fn deps_with(provider: MockTenantProvider, client: MockRemoteClient) -> PublisherDeps {
        PublisherDeps {
            tenant_cache: Arc::new(TenantCache::new(
                Arc::new(provider),
                Duration::from_secs(60),
            )),
            client: Arc::new(client),
            metrics: PublisherMetrics::new(&Registry::new()),
            retry: fast_retry(),
        }
    }

    fn metric_payload(tenant_id: i64) -> Payload {
        Payload {
            tenant_id,
            time_series: vec![TimeSeries {
                labels: vec![
                    Label::new("__name__", "probe_success"),
                    Label::new("label_env", "prod"),
                ],
                samples: vec![Sample {
                    timestamp_ms: 1_700_000_000_000,
                    value: 1.0,
                }],
            }],
            streams: vec![LogStream {
                labels: vec![Label::new("probe", "test")],
                entries: vec![],
            }],
        }
    }

    #[test]
    fn routes_metrics_and_logs_to_tenant_remotes() {
        let mut provider = MockTenantProvider::new();
        provider
            .expect_get_tenant()
            .returning(|id, _| Ok(routable_tenant(id, 1.0)));

        let (metrics_sender, metrics_delivered) = mpsc::channel();
        let (logs_sender, logs_delivered) = mpsc::channel();
        let mut client = MockRemoteClient::new();
        client.expect_send_metrics().returning(move |remote, series| {
            metrics_sender
                .send((remote.clone(), series.to_vec()))
                .unwrap();
            Ok(())
        });
        client.expect_send_logs().returning(move |remote, streams| {
            logs_sender.send((remote.clone(), streams.to_vec())).unwrap();
            Ok(())
        });

        let publisher = QueuedPublisher::new(deps_with(provider, client));
        publisher.publish(metric_payload(1));

        let (remote, series) = metrics_delivered
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(remote.name, "prom");
        assert_eq!(series[0].name(), Some("probe_success"));

        let (remote, _) = logs_delivered
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(remote.name, "loki");

        publisher.stop();
    }

    #[test]
    fn unresolvable_tenant_drops_with_counter() {
        let mut provider = MockTenantProvider::new();
        provider
            .expect_get_tenant()
            .returning(|_, _| Err(TenantProviderError::Lookup("down".to_string())));
        let mut client = MockRemoteClient::new();
        client.expect_send_metrics().never();
        client.expect_send_logs().never();

        let deps = deps_with(provider, client);
        let metrics = deps.metrics.clone();
        let publisher = QueuedPublisher::new(deps);
        publisher.publish(metric_payload(1));
        publisher.stop();

        assert_eq!(
            metrics
                .dropped_total
                .with_label_values(&["metrics", "tenant_unresolved"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .dropped_total
                .with_label_values(&["logs", "tenant_unresolved"])
                .get(),
            1
        );
    }

    #[test]
    fn retries_until_success() {
        let mut provider = MockTenantProvider::new();
        provider
            .expect_get_tenant()
            .returning(|id, _| Ok(routable_tenant(id, 1.0)));

        let (done_sender, done) = mpsc::channel();
        let mut attempts = 0;
        let mut client = MockRemoteClient::new();
        client.expect_send_metrics().returning(move |_, _| {
            attempts += 1;
            if attempts < 3 {
                Err(RemoteClientError::Transport("flaky".to_string()))
            } else {
                done_sender.send(()).unwrap();
                Ok(())
            }
        });
        client.expect_send_logs().returning(|_, _| Ok(()));

        let deps = deps_with(provider, client);
        let metrics = deps.metrics.clone();
        let publisher = QueuedPublisher::new(deps);
        publisher.publish(metric_payload(1));

        done.recv_timeout(Duration::from_secs(5)).unwrap();
        publisher.stop();

        assert_eq!(
            metrics.retries_total.with_label_values(&["metrics"]).get(),
            2
        );
        assert_eq!(
            metrics.pushed_total.with_label_values(&["metrics"]).get(),
            1
        );
    }

    #[test]
    fn permanent_error_drops_without_retry() {
        let mut provider = MockTenantProvider::new();
        provider
            .expect_get_tenant()
            .returning(|id, _| Ok(routable_tenant(id, 1.0)));

        let mut client = MockRemoteClient::new();
        client
            .expect_send_metrics()
            .times(1)
            .returning(|_, _| Err(RemoteClientError::Status(400)));
        client.expect_send_logs().returning(|_, _| Ok(()));

        let deps = deps_with(provider, client);
        let metrics = deps.metrics.clone();
        let publisher = QueuedPublisher::new(deps);
        publisher.publish(metric_payload(1));
        publisher.stop();

        assert_eq!(
            metrics
                .dropped_total
                .with_label_values(&["metrics", "permanent_error"])
                .get(),
            1
        );
        assert_eq!(
            metrics.retries_total.with_label_values(&["metrics"]).get(),
            0
        );
    }

    #[test]
    fn retry_exhaustion_drops_with_counter() {
        let mut provider = MockTenantProvider::new();
        provider
            .expect_get_tenant()
            .returning(|id, _| Ok(routable_tenant(id, 1.0)));

        let mut client = MockRemoteClient::new();
        client
            .expect_send_metrics()
            .times(3)
            .returning(|_, _| Err(RemoteClientError::Transport("down".to_string())));
        client.expect_send_logs().returning(|_, _| Ok(()));

        let deps = deps_with(provider, client);
        let metrics = deps.metrics.clone();
        let publisher = QueuedPublisher::new(deps);
        publisher.publish(metric_payload(1));
        publisher.stop();

        assert_eq!(
            metrics
                .dropped_total
                .with_label_values(&["metrics", "retry_exhausted"])
                .get(),
            1
        );
    }

    #[test]
    fn strips_label_prefix_for_opted_out_tenants() {
        let mut provider = MockTenantProvider::new();
        provider.expect_get_tenant().returning(|id, _| {
            let mut tenant = routable_tenant(id, 1.0);
            tenant.omit_label_prefix = true;
            Ok(tenant)
        });

        let (sender, delivered) = mpsc::channel();
        let mut client = MockRemoteClient::new();
        client.expect_send_metrics().returning(move |_, series| {
            sender.send(series.to_vec()).unwrap();
            Ok(())
        });
        client.expect_send_logs().returning(|_, _| Ok(()));

        let publisher = QueuedPublisher::new(deps_with(provider, client));
        publisher.publish(metric_payload(1));

        let series = delivered.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(series[0]
            .labels
            .iter()
            .any(|label| label.name == "env" && label.value == "prod"));
        publisher.stop();
    }
}
