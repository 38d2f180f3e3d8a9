use crate::checks::model::Check;
use crate::event::channel::EventConsumer;
use crate::event::{ApplicationEvent, CheckEvent, LimitEvent, SessionEvent};
use crate::manager::limits::TenantLimiter;
use crate::scraper::prober::ProberRegistry;
use crate::scraper::{NotStartedScraper, ScraperDeps, StartedScraper};
use crossbeam::channel::never;
use crossbeam::select;
use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, IntCounter, IntCounterVec, IntGauge, Registry,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

pub mod limits;

#[derive(Clone)]
pub struct ManagerMetrics {
    checks_dropped_total: IntCounterVec,
    updates_ignored_stale: IntCounter,
    scrapers_running: IntGauge,
}

impl ManagerMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            checks_dropped_total: register_int_counter_vec_with_registry!(
                "sm_agent_checks_dropped_total",
                "Checks dropped instead of scraped, by reason.",
                &["reason"],
                registry
            )
            .expect("metric registration should not fail"),
            updates_ignored_stale: register_int_counter_with_registry!(
                "sm_agent_check_updates_ignored_stale_total",
                "Check updates ignored because a newer version was already running.",
                registry
            )
            .expect("metric registration should not fail"),
            scrapers_running: register_int_gauge_with_registry!(
                "sm_agent_scrapers_running",
                "Scrapers currently running.",
                registry
            )
            .expect("metric registration should not fail"),
        }
    }

    fn drop_check(&self, reason: &str) {
        self.checks_dropped_total.with_label_values(&[reason]).inc();
    }
}

struct ScraperEntry {
    check: Check,
    scraper: StartedScraper,
}

/// The authoritative `check id -> scraper` map. Owned exclusively by the
/// manager's control thread; scrapers themselves run on their own threads.
#[derive(Default)]
struct ScraperEntries(HashMap<i64, ScraperEntry>);

impl ScraperEntries {
    fn check(&self, check_id: i64) -> Option<&Check> {
        self.0.get(&check_id).map(|entry| &entry.check)
    }

    fn ids(&self) -> Vec<i64> {
        self.0.keys().copied().collect()
    }

    fn of_tenant(&self, tenant_id: i64) -> Vec<i64> {
        self.0
            .values()
            .filter(|entry| entry.check.tenant_id == tenant_id)
            .map(|entry| entry.check.id)
            .collect()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn insert(&mut self, check: Check, scraper: StartedScraper) {
        self.0.insert(check.id, ScraperEntry { check, scraper });
    }

    fn update_in_place(&mut self, check: Check) {
        if let Some(entry) = self.0.get_mut(&check.id) {
            entry.scraper.update_check(check.clone());
            entry.check = check;
        }
    }

    fn stop_and_remove(&mut self, check_id: i64) -> bool {
        match self.0.remove(&check_id) {
            Some(entry) => {
                info!(check_id, "stopping scraper");
                if let Err(err) = entry.scraper.stop() {
                    error!(check_id, %err, "error stopping scraper");
                }
                true
            }
            None => false,
        }
    }

    /// Cancels every scraper first, then waits for each to finish, so
    /// shutdown latency is one in-flight run rather than their sum.
    fn stop_all(mut self) {
        for entry in self.0.values_mut() {
            entry.scraper.cancel();
        }
        for (check_id, entry) in self.0.drain() {
            if let Err(err) = entry.scraper.stop() {
                error!(check_id, %err, "error stopping scraper");
            }
        }
    }
}

/// Applies the control-plane's check change events to the live scraper set.
///
/// All map mutations happen on the thread running [`ScraperManager::run`];
/// events for one check are therefore applied in the order received. A bad
/// event is logged, counted and dropped; the manager never terminates on one.
pub struct ScraperManager {
    check_consumer: EventConsumer<CheckEvent>,
    session_consumer: EventConsumer<SessionEvent>,
    application_consumer: EventConsumer<ApplicationEvent>,
    limit_consumer: EventConsumer<LimitEvent>,
    prober_registry: Arc<ProberRegistry>,
    limiter: Arc<dyn TenantLimiter>,
    scraper_deps: ScraperDeps,
    metrics: ManagerMetrics,
}

impl ScraperManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        check_consumer: EventConsumer<CheckEvent>,
        session_consumer: EventConsumer<SessionEvent>,
        application_consumer: EventConsumer<ApplicationEvent>,
        limit_consumer: EventConsumer<LimitEvent>,
        prober_registry: Arc<ProberRegistry>,
        limiter: Arc<dyn TenantLimiter>,
        scraper_deps: ScraperDeps,
        metrics: ManagerMetrics,
    ) -> Self {
        Self {
            check_consumer,
            session_consumer,
            application_consumer,
            limit_consumer,
            prober_registry,
            limiter,
            scraper_deps,
            metrics,
        }
    }

    /// The manager's control loop. Blocks until an
    /// [`ApplicationEvent::StopRequested`] arrives, then stops every scraper
    /// and waits for their completion before returning.
    pub fn run(self) {
        info!("scraper manager started");
        let mut scrapers = ScraperEntries::default();

        let never_checks = EventConsumer::from(never());
        let never_session = EventConsumer::from(never());
        let never_limits = EventConsumer::from(never());
        let mut check_consumer = &self.check_consumer;
        let mut session_consumer = &self.session_consumer;
        let mut limit_consumer = &self.limit_consumer;

        loop {
            select! {
                recv(check_consumer.as_ref()) -> event => {
                    let span = info_span!("process_check_event");
                    let _span_guard = span.enter();
                    match event {
                        Ok(event) => self.handle_check_event(&mut scrapers, event),
                        Err(_) => {
                            debug!("check event channel closed");
                            check_consumer = &never_checks;
                        }
                    }
                },
                recv(session_consumer.as_ref()) -> event => {
                    match event {
                        Ok(SessionEvent::Connected) => info!("control-plane session established"),
                        // Scrapers keep running on their current definitions
                        // while the stream is down; no new events can arrive.
                        Ok(SessionEvent::StreamLost) => warn!("control-plane stream lost"),
                        // The server re-sends the authoritative snapshot on
                        // resume; the diff happens when it arrives.
                        Ok(SessionEvent::StreamResumed) => info!("control-plane stream resumed"),
                        Err(_) => {
                            debug!("session event channel closed");
                            session_consumer = &never_session;
                        }
                    }
                },
                recv(limit_consumer.as_ref()) -> event => {
                    match event {
                        Ok(LimitEvent { tenant_id }) => self.enforce_limits(&mut scrapers, tenant_id),
                        Err(_) => {
                            debug!("limit event channel closed");
                            limit_consumer = &never_limits;
                        }
                    }
                },
                recv(self.application_consumer.as_ref()) -> _ => {
                    debug!("stopping scraper manager");
                    break;
                },
            }
        }

        scrapers.stop_all();
        info!("scraper manager finished");
    }

    fn handle_check_event(&self, scrapers: &mut ScraperEntries, event: CheckEvent) {
        match event {
            CheckEvent::Added(check) => self.apply_add(scrapers, check),
            CheckEvent::Updated(check) => self.apply_update(scrapers, check),
            CheckEvent::Deleted(check_id) => self.apply_delete(scrapers, check_id),
            CheckEvent::Snapshot(checks) => self.apply_snapshot(scrapers, checks),
        }
    }

    fn apply_add(&self, scrapers: &mut ScraperEntries, check: Check) {
        if scrapers.check(check.id).is_some() {
            // A re-announced check (snapshots do this) is an update.
            return self.apply_update(scrapers, check);
        }
        debug!(check_id = check.id, "adding check");
        self.start_scraper(scrapers, check);
    }

    fn apply_update(&self, scrapers: &mut ScraperEntries, check: Check) {
        let Some(current) = scrapers.check(check.id) else {
            // An update for a check this probe never saw (e.g. reassigned to
            // it while disconnected) behaves like an add.
            debug!(check_id = check.id, "update for unknown check, adding");
            return self.start_scraper(scrapers, check);
        };

        if check.modified < current.modified {
            debug!(check_id = check.id, "ignoring stale check update");
            self.metrics.updates_ignored_stale.inc();
            return;
        }
        if check.modified == current.modified {
            return;
        }

        if current.schedule_changed_by(&check) {
            info!(check_id = check.id, "recreating scraper for updated check");
            scrapers.stop_and_remove(check.id);
            self.metrics.scrapers_running.set(scrapers.len() as i64);
            self.start_scraper(scrapers, check);
        } else {
            debug!(check_id = check.id, "updating check labels in place");
            scrapers.update_in_place(check);
        }
    }

    fn apply_delete(&self, scrapers: &mut ScraperEntries, check_id: i64) {
        if !scrapers.stop_and_remove(check_id) {
            debug!(check_id, "delete for unknown check");
        }
        self.metrics.scrapers_running.set(scrapers.len() as i64);
    }

    /// Diffs the authoritative snapshot against the live set: anything the
    /// server no longer knows gets a synthetic delete, then the snapshot is
    /// applied as adds/updates.
    fn apply_snapshot(&self, scrapers: &mut ScraperEntries, checks: Vec<Check>) {
        info!(count = checks.len(), "applying authoritative check snapshot");
        let incoming: HashSet<i64> = checks.iter().map(|check| check.id).collect();
        for check_id in scrapers.ids() {
            if !incoming.contains(&check_id) {
                self.apply_delete(scrapers, check_id);
            }
        }
        for check in checks {
            self.apply_add(scrapers, check);
        }
    }

    fn start_scraper(&self, scrapers: &mut ScraperEntries, check: Check) {
        if let Err(err) = check.validate() {
            warn!(check_id = check.id, %err, "dropping invalid check");
            self.metrics.drop_check("invalid_check");
            return;
        }
        if let Err(err) = self.limiter.allows(check.tenant_id, check.class()) {
            warn!(check_id = check.id, %err, "dropping check over tenant limit");
            self.metrics.drop_check("over_limit");
            return;
        }
        match self.prober_registry.build(&check) {
            Ok(prober) => {
                let scraper =
                    NotStartedScraper::new(check.clone(), prober, self.scraper_deps.clone())
                        .start();
                scrapers.insert(check, scraper);
                self.metrics.scrapers_running.set(scrapers.len() as i64);
            }
            Err(err) => {
                warn!(check_id = check.id, %err, "dropping unsupported check");
                self.metrics.drop_check("unsupported_check");
            }
        }
    }

    /// Re-evaluates a tenant's running scrapers after its limits changed,
    /// stopping any that are no longer allowed.
    fn enforce_limits(&self, scrapers: &mut ScraperEntries, tenant_id: i64) {
        for check_id in scrapers.of_tenant(tenant_id) {
            let Some(check) = scrapers.check(check_id) else {
                continue;
            };
            if let Err(err) = self.limiter.allows(tenant_id, check.class()) {
                warn!(check_id, %err, "stopping scraper over changed tenant limit");
                self.metrics.drop_check("over_limit");
                scrapers.stop_and_remove(check_id);
            }
        }
        self.metrics.scrapers_running.set(scrapers.len() as i64);
    }
}
