use crate::checks::model::{CheckClass, Label};
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::{pub_sub, EventConsumer, EventPublisher};
use crate::utils::threads::spawn_named_thread;
use crossbeam::channel::{never, tick, Receiver};
use crossbeam::select;
use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry, IntCounter,
    IntCounterVec, Registry,
};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Placeholder cost-attribution key for executions without any attribution
/// labels, so they still land in a well-defined accumulator.
pub const MISSING_COST_KEY: &str = "__MISSING__";

/// Upper bound of the uniform jitter added to the configured push span so
/// probes started together do not push in lockstep.
const PUSH_JITTER: Duration = Duration::from_secs(60);

/// One execution counts as this many sampled execution units per started
/// minute of runtime.
const SAMPLE_SPAN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum TelemetryPushError {
    #[error("telemetry push failed: {0}")]
    Push(String),
}

/// The transport pushing region summaries back to the control plane. The
/// implementation must use a detached timeout, not the caller's shutdown
/// context: the final push happens while the agent is going down.
pub trait TelemetryPusher: Send + Sync {
    fn push(&self, telemetry: RegionTelemetry) -> Result<(), TelemetryPushError>;
}

/// A single completed scrape, as counted towards tenant billing telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub local_tenant_id: i64,
    pub region_id: i32,
    pub check_class: CheckClass,
    pub duration: Duration,
    pub cost_attribution: Vec<Label>,
}

/// Accumulated counters for one (tenant, class, cost-key) cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckClassTelemetry {
    pub local_tenant_id: i64,
    pub check_class: CheckClass,
    pub executions: i64,
    pub duration_seconds: f64,
    pub sampled_executions: i64,
    pub cost_attribution: Vec<Label>,
}

/// The pushed summary for one region over one tick interval.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegionTelemetry {
    pub region_id: i32,
    pub telemetry: Vec<CheckClassTelemetry>,
}

/// Canonical form of a cost-attribution label set: sorted by name, joined as
/// `name=value,name=value`. Stable across label ordering on the check.
pub fn cost_attribution_key(labels: &[Label]) -> String {
    if labels.is_empty() {
        return MISSING_COST_KEY.to_string();
    }
    let mut sorted: Vec<&Label> = labels.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
        .iter()
        .map(|label| format!("{}={}", label.name, label.value))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Clone)]
pub struct TelemetryMetrics {
    executions_total: IntCounter,
    pushes_total: IntCounterVec,
    push_errors_total: IntCounterVec,
}

impl TelemetryMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            executions_total: register_int_counter_with_registry!(
                "sm_agent_telemetry_executions_total",
                "Executions recorded by the telemetry aggregator.",
                registry
            )
            .expect("metric registration should not fail"),
            pushes_total: register_int_counter_vec_with_registry!(
                "sm_agent_telemetry_pushes_total",
                "Telemetry pushes per region.",
                &["region_id"],
                registry
            )
            .expect("metric registration should not fail"),
            push_errors_total: register_int_counter_vec_with_registry!(
                "sm_agent_telemetry_push_errors_total",
                "Failed telemetry pushes per region.",
                &["region_id"],
                registry
            )
            .expect("metric registration should not fail"),
        }
    }
}

/// Produces the tick source driving a region pusher. Injectable so tests can
/// drive ticks by hand.
pub type TickerFactory = Box<dyn Fn(Duration) -> Receiver<Instant> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AccumulatorKey {
    local_tenant_id: i64,
    check_class: CheckClass,
    cost_key: String,
}

type Accumulators = Arc<Mutex<HashMap<AccumulatorKey, CheckClassTelemetry>>>;

/// Per-region accumulator plus the driver thread pushing its snapshots.
struct RegionPusher {
    accumulators: Accumulators,
    stop_publisher: EventPublisher<CancellationMessage>,
    handle: JoinHandle<()>,
}

impl RegionPusher {
    fn spawn(
        region_id: i32,
        pusher: Arc<dyn TelemetryPusher>,
        ticker: Receiver<Instant>,
        metrics: TelemetryMetrics,
    ) -> Self {
        let accumulators: Accumulators = Arc::default();
        let (stop_publisher, stop_consumer) = pub_sub();

        let driver_accumulators = Arc::clone(&accumulators);
        let handle = spawn_named_thread(format!("telemetry-region-{region_id}"), move || {
            run_driver(
                region_id,
                driver_accumulators,
                pusher,
                ticker,
                stop_consumer,
                metrics,
            )
        });

        Self {
            accumulators,
            stop_publisher,
            handle,
        }
    }

    fn add(&self, execution: Execution) {
        let key = AccumulatorKey {
            local_tenant_id: execution.local_tenant_id,
            check_class: execution.check_class,
            cost_key: cost_attribution_key(&execution.cost_attribution),
        };
        let mut accumulators = self
            .accumulators
            .lock()
            .expect("telemetry accumulator lock poisoned");
        let cell = accumulators.entry(key).or_insert_with(|| CheckClassTelemetry {
            local_tenant_id: execution.local_tenant_id,
            check_class: execution.check_class,
            executions: 0,
            duration_seconds: 0.0,
            sampled_executions: 0,
            cost_attribution: execution.cost_attribution.clone(),
        });
        cell.executions += 1;
        cell.duration_seconds += execution.duration.as_secs_f64();
        cell.sampled_executions +=
            (execution.duration.as_secs_f64() / SAMPLE_SPAN.as_secs_f64()).ceil() as i64;
    }

    fn stop(self) {
        let _ = self.stop_publisher.publish(());
        drop(self.stop_publisher);
        if self.handle.join().is_err() {
            warn!("telemetry region pusher thread panicked");
        }
    }
}

fn run_driver(
    region_id: i32,
    accumulators: Accumulators,
    pusher: Arc<dyn TelemetryPusher>,
    mut ticker: Receiver<Instant>,
    stop_consumer: EventConsumer<CancellationMessage>,
    metrics: TelemetryMetrics,
) {
    loop {
        select! {
            recv(ticker) -> tick => match tick {
                Ok(_) => {
                    push_accumulated(region_id, &accumulators, pusher.as_ref(), &metrics, false);
                }
                // A closed ticker must not spin the loop; keep serving stop.
                Err(_) => ticker = never(),
            },
            recv(stop_consumer.as_ref()) -> _ => {
                // One final push so executions recorded right before shutdown
                // still reach the control plane.
                push_accumulated(region_id, &accumulators, pusher.as_ref(), &metrics, true);
                break;
            },
        }
    }
}

fn push_accumulated(
    region_id: i32,
    accumulators: &Accumulators,
    pusher: &dyn TelemetryPusher,
    metrics: &TelemetryMetrics,
    is_final: bool,
) {
    let snapshot: Vec<CheckClassTelemetry> = {
        let mut accumulators = accumulators
            .lock()
            .expect("telemetry accumulator lock poisoned");
        accumulators.drain().map(|(_, cell)| cell).collect()
    };
    if snapshot.is_empty() && !is_final {
        return;
    }

    let telemetry = RegionTelemetry {
        region_id,
        telemetry: snapshot,
    };
    let region_label = region_id.to_string();
    match pusher.push(telemetry) {
        Ok(()) => {
            metrics.pushes_total.with_label_values(&[&region_label]).inc();
            debug!(region_id, is_final, "pushed region telemetry");
        }
        Err(err) => {
            metrics
                .push_errors_total
                .with_label_values(&[&region_label])
                .inc();
            warn!(region_id, error = %err, "failed to push region telemetry");
        }
    }
}

/// Region-keyed telemetry aggregator. Region pushers are created lazily on
/// the first execution seen for that region.
pub struct Telemeter {
    pusher: Arc<dyn TelemetryPusher>,
    span: Duration,
    ticker_factory: TickerFactory,
    metrics: TelemetryMetrics,
    regions: RwLock<HashMap<i32, RegionPusher>>,
}

impl Telemeter {
    pub fn new(pusher: Arc<dyn TelemetryPusher>, span: Duration, registry: &Registry) -> Self {
        Self::with_ticker_factory(
            pusher,
            span,
            TelemetryMetrics::new(registry),
            Box::new(|period| tick(period)),
        )
    }

    pub fn with_ticker_factory(
        pusher: Arc<dyn TelemetryPusher>,
        span: Duration,
        metrics: TelemetryMetrics,
        ticker_factory: TickerFactory,
    ) -> Self {
        Self {
            pusher,
            span,
            ticker_factory,
            metrics,
            regions: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_execution(&self, execution: Execution) {
        self.metrics.executions_total.inc();

        {
            let regions = self.regions.read().expect("telemetry region lock poisoned");
            if let Some(region) = regions.get(&execution.region_id) {
                region.add(execution);
                return;
            }
        }

        let mut regions = self.regions.write().expect("telemetry region lock poisoned");
        // Another writer may have created the pusher while the read lock was
        // released; re-check before creating.
        let region = regions.entry(execution.region_id).or_insert_with(|| {
            let period = self.span + PUSH_JITTER.mul_f64(rand::thread_rng().gen_range(0.0..1.0));
            debug!(
                region_id = execution.region_id,
                period_secs = period.as_secs(),
                "starting region telemetry pusher"
            );
            RegionPusher::spawn(
                execution.region_id,
                Arc::clone(&self.pusher),
                (self.ticker_factory)(period),
                self.metrics.clone(),
            )
        });
        region.add(execution);
    }

    /// Stops every region pusher, delivering one final snapshot each.
    pub fn stop(&self) {
        let mut regions = self.regions.write().expect("telemetry region lock poisoned");
        for (_, region) in regions.drain() {
            region.stop();
        }
    }
}
