use super::config::{AgentConfig, ConfigError};
use crate::event::broadcaster::unbounded::UnboundedBroadcast;
use crate::event::channel::{pub_sub, EventConsumer};
use crate::event::ApplicationEvent;
use crate::logging::LoggingError;
use crate::manager::limits::UnlimitedTenants;
use crate::manager::{ManagerMetrics, ScraperManager};
use crate::publisher::remote::{HttpRemoteClient, RemoteClientError};
use crate::publisher::{
    PublisherDeps, PublisherMetrics, PublisherRegistry, RetryConfig, UnknownPublisherError,
};
use crate::scraper::prober::ProberRegistry;
use crate::scraper::{ScraperDeps, ScraperMetrics};
use crate::server::{ServerError, StatusServer, StatusSource};
use crate::session::{ControlPlaneSession, SessionConfig, SessionMetrics};
use crate::telemetry::{Telemeter, TelemetryPusher};
use crate::tenant::cache::TenantCache;
use crate::tenant::TenantProvider;
use prometheus::Registry;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{error, info};

/// Per-request timeout towards tenant remotes.
const REMOTE_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error("failed to build the async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Publisher(#[from] UnknownPublisherError),
    #[error("failed to build the outbound HTTP client: {0}")]
    RemoteClient(#[from] RemoteClientError),
    #[error("failed to install the shutdown signal handler: {0}")]
    SignalHandler(String),
}

/// Wires the runtime together and runs until an orderly shutdown: session,
/// tenant cache, publisher, telemetry, manager and the admin server.
///
/// Shutdown order matters: the manager stops scrapers first (they may still
/// publish), the publisher then drains within its grace period, the
/// telemeter delivers its final pushes while the session is still alive, and
/// the session goes down last.
pub fn run_agent(config: AgentConfig) -> Result<(), AgentError> {
    info!(
        probe_name = %config.probe_name,
        api_server = %config.api_server_address,
        "starting probe agent"
    );

    #[cfg(unix)]
    let disconnect_signals = signals::block_disconnect_signal();

    let registry = Registry::new();
    let runtime = Arc::new(Runtime::new()?);

    let (application_publisher, application_consumer) = pub_sub();
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        let _ = application_publisher.publish(ApplicationEvent::StopRequested);
    })
    .map_err(|err| AgentError::SignalHandler(err.to_string()))?;

    let (check_publisher, check_consumer) = pub_sub();
    let mut session_broadcast = UnboundedBroadcast::default();
    let manager_session_consumer = EventConsumer::from(session_broadcast.subscribe());

    let session = ControlPlaneSession::new(
        SessionConfig {
            server_address: config.api_server_address.clone(),
            token: config.api_token.clone(),
            insecure_plaintext: config.insecure_plaintext,
            probe_name: config.probe_name.clone(),
        },
        check_publisher,
        session_broadcast,
        SessionMetrics::new(&registry),
        Arc::clone(&runtime),
    )
    .start();
    let session_handle = session.handle();

    #[cfg(unix)]
    if let Some(signals) = disconnect_signals {
        signals::spawn_disconnect_listener(signals, session.handle());
    }

    let tenant_cache = Arc::new(TenantCache::new(
        Arc::clone(&session_handle) as Arc<dyn TenantProvider>,
        config.tenant_cache_ttl,
    ));
    let remote_client = Arc::new(HttpRemoteClient::new(REMOTE_WRITE_TIMEOUT)?);
    let publisher = PublisherRegistry::with_defaults().build(
        &config.publisher,
        PublisherDeps {
            tenant_cache,
            client: remote_client,
            metrics: PublisherMetrics::new(&registry),
            retry: RetryConfig::default(),
        },
    )?;

    let telemeter = Arc::new(Telemeter::new(
        Arc::clone(&session_handle) as Arc<dyn TelemetryPusher>,
        config.telemetry_period,
        &registry,
    ));

    let server = StatusServer::start(
        config.listen_address,
        Arc::clone(&session_handle) as Arc<dyn StatusSource>,
        registry.clone(),
    )?;

    // The default deployment has no external limits oracle; the seam stays.
    let (_limit_publisher, limit_consumer) = pub_sub();

    let manager = ScraperManager::new(
        check_consumer,
        manager_session_consumer,
        application_consumer,
        limit_consumer,
        Arc::new(ProberRegistry::with_builtins()),
        Arc::new(UnlimitedTenants),
        ScraperDeps {
            publisher: Arc::clone(&publisher),
            telemeter: Arc::clone(&telemeter),
            probe_name: config.probe_name.clone(),
            cost_attribution_labels: config.cost_attribution_labels.clone(),
            metrics: ScraperMetrics::new(&registry),
        },
        ManagerMetrics::new(&registry),
    );

    // Blocks until a stop is requested; stops and waits for every scraper.
    manager.run();

    publisher.stop();
    telemeter.stop();
    session.stop();
    server.stop();

    info!("probe agent finished");
    Ok(())
}

#[cfg(unix)]
mod signals {
    use crate::session::SessionHandle;
    use crate::utils::threads::spawn_named_thread;
    use nix::sys::signal::{SigSet, Signal};
    use std::sync::Arc;
    use tracing::{info, warn};

    /// Blocks SIGUSR1 for this thread (and everything spawned after), so it
    /// can be consumed synchronously by the listener instead of killing the
    /// process.
    pub(super) fn block_disconnect_signal() -> Option<SigSet> {
        let mut signals = SigSet::empty();
        signals.add(Signal::SIGUSR1);
        match signals.thread_block() {
            Ok(()) => Some(signals),
            Err(err) => {
                warn!(error = %err, "could not block SIGUSR1, disconnect signal disabled");
                None
            }
        }
    }

    /// SIGUSR1 requests a disconnect-and-reconnect of the control-plane
    /// session, keeping scrapers running.
    pub(super) fn spawn_disconnect_listener(signals: SigSet, handle: Arc<SessionHandle>) {
        spawn_named_thread("signal-listener", move || loop {
            match signals.wait() {
                Ok(Signal::SIGUSR1) => {
                    info!("SIGUSR1 received, requesting control-plane disconnect");
                    handle.request_disconnect();
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "signal wait failed, stopping listener");
                    return;
                }
            }
        });
    }
}
