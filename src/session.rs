use crate::checks::model::Check;
use crate::checks::secret::Secret;
use crate::event::broadcaster::unbounded::UnboundedBroadcast;
use crate::event::channel::EventPublisher;
use crate::event::{CheckEvent, SessionEvent};
use crate::session::client::ApiClient;
use crate::telemetry::{RegionTelemetry, TelemetryPushError, TelemetryPusher};
use crate::tenant::{Tenant, TenantProvider, TenantProviderError};
use crate::utils::backoff::Backoff;
use crate::utils::threads::spawn_named_thread;
use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry, IntCounter,
    IntCounterVec, Registry,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tonic::Streaming;
use tracing::{debug, info, warn};

pub mod client;
pub mod convert;
pub mod proto;

/// How long the session stays down after an operator-requested disconnect
/// before dialing again.
const DISCONNECT_PAUSE: Duration = Duration::from_secs(60);

/// Detached deadline for telemetry pushes: deliberately not tied to shutdown
/// so the final snapshot still goes out while the agent is exiting.
const TELEMETRY_PUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Close the control-plane session but keep scrapers running; the loop
    /// reconnects after [`DISCONNECT_PAUSE`].
    Disconnect,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub server_address: String,
    pub token: Secret,
    pub insecure_plaintext: bool,
    pub probe_name: String,
}

#[derive(Clone)]
pub struct SessionMetrics {
    connects_total: IntCounter,
    stream_errors_total: IntCounter,
    events_total: IntCounterVec,
    convert_errors_total: IntCounter,
}

impl SessionMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            connects_total: register_int_counter_with_registry!(
                "sm_agent_session_connects_total",
                "Successfully established change streams.",
                registry
            )
            .expect("metric registration should not fail"),
            stream_errors_total: register_int_counter_with_registry!(
                "sm_agent_session_stream_errors_total",
                "Connection attempts or streams that ended in an error.",
                registry
            )
            .expect("metric registration should not fail"),
            events_total: register_int_counter_vec_with_registry!(
                "sm_agent_session_events_total",
                "Change events received, by operation.",
                &["op"],
                registry
            )
            .expect("metric registration should not fail"),
            convert_errors_total: register_int_counter_with_registry!(
                "sm_agent_session_convert_errors_total",
                "Change events dropped because the wire form was invalid.",
                registry
            )
            .expect("metric registration should not fail"),
        }
    }
}

/// The session's face towards the synchronous world: readiness, the
/// disconnect command, and the RPC transports for tenant lookups and
/// telemetry pushes (bridged with `block_on`).
pub struct SessionHandle {
    runtime: Arc<Runtime>,
    client: Mutex<Option<ApiClient>>,
    ready: AtomicBool,
    commands: UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// One-shot readiness: latched on the first successful connection and
    /// never cleared, because a previously-ready probe keeps executing its
    /// current check set through disconnects.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn request_disconnect(&self) {
        let _ = self.commands.send(SessionCommand::Disconnect);
    }

    fn set_client(&self, client: Option<ApiClient>) {
        *self.client.lock().expect("session client lock poisoned") = client;
    }

    fn current_client(&self) -> Option<ApiClient> {
        self.client
            .lock()
            .expect("session client lock poisoned")
            .clone()
    }
}

impl TenantProvider for SessionHandle {
    fn get_tenant(
        &self,
        tenant_id: i64,
        timeout: Duration,
    ) -> Result<Tenant, TenantProviderError> {
        let mut client = self
            .current_client()
            .ok_or(TenantProviderError::NotConnected)?;
        let tenant = self
            .runtime
            .block_on(async move {
                client
                    .get_tenant(proto::TenantInfo { id: tenant_id }, timeout)
                    .await
            })
            .map_err(|status| TenantProviderError::Lookup(status.to_string()))?;
        Ok(tenant.into())
    }
}

impl TelemetryPusher for SessionHandle {
    fn push(&self, telemetry: RegionTelemetry) -> Result<(), TelemetryPushError> {
        let mut client = self
            .current_client()
            .ok_or_else(|| TelemetryPushError::Push("control plane not connected".to_string()))?;
        let response = self
            .runtime
            .block_on(async move {
                tokio::time::timeout(
                    TELEMETRY_PUSH_TIMEOUT,
                    client.push_telemetry(telemetry.into()),
                )
                .await
            })
            .map_err(|_| TelemetryPushError::Push("telemetry push timed out".to_string()))?
            .map_err(|status| TelemetryPushError::Push(status.to_string()))?;

        match response.status {
            Some(status) if status.code == proto::StatusCode::Ok as i32 => Ok(()),
            Some(status) => Err(TelemetryPushError::Push(format!(
                "control plane rejected telemetry: code {} {}",
                status.code, status.message
            ))),
            None => Err(TelemetryPushError::Push(
                "control plane response carried no status".to_string(),
            )),
        }
    }
}

/// The control-plane session, not yet running.
pub struct ControlPlaneSession {
    config: SessionConfig,
    check_publisher: EventPublisher<CheckEvent>,
    session_broadcast: UnboundedBroadcast<SessionEvent>,
    metrics: SessionMetrics,
    runtime: Arc<Runtime>,
}

impl ControlPlaneSession {
    pub fn new(
        config: SessionConfig,
        check_publisher: EventPublisher<CheckEvent>,
        session_broadcast: UnboundedBroadcast<SessionEvent>,
        metrics: SessionMetrics,
        runtime: Arc<Runtime>,
    ) -> Self {
        Self {
            config,
            check_publisher,
            session_broadcast,
            metrics,
            runtime,
        }
    }

    /// Spawns the connection loop on its own thread and returns the running
    /// session.
    pub fn start(self) -> StartedSession {
        let (command_sender, command_receiver) = unbounded_channel();
        let handle = Arc::new(SessionHandle {
            runtime: Arc::clone(&self.runtime),
            client: Mutex::new(None),
            ready: AtomicBool::new(false),
            commands: command_sender.clone(),
        });

        let loop_handle = Arc::clone(&handle);
        let runtime = Arc::clone(&self.runtime);
        let thread = spawn_named_thread("control-plane-session", move || {
            runtime.block_on(connection_loop(
                self.config,
                self.check_publisher,
                self.session_broadcast,
                self.metrics,
                loop_handle,
                command_receiver,
            ));
        });

        StartedSession {
            handle,
            command_sender,
            thread,
        }
    }
}

pub struct StartedSession {
    handle: Arc<SessionHandle>,
    command_sender: UnboundedSender<SessionCommand>,
    thread: JoinHandle<()>,
}

impl StartedSession {
    pub fn handle(&self) -> Arc<SessionHandle> {
        Arc::clone(&self.handle)
    }

    pub fn stop(self) {
        let _ = self.command_sender.send(SessionCommand::Shutdown);
        if self.thread.join().is_err() {
            warn!("control-plane session thread panicked");
        }
    }
}

enum StreamOutcome {
    Lost,
    Disconnected,
    Shutdown,
}

#[derive(Debug)]
enum WaitOutcome {
    Elapsed,
    Shutdown,
}

async fn connection_loop(
    config: SessionConfig,
    check_publisher: EventPublisher<CheckEvent>,
    session_broadcast: UnboundedBroadcast<SessionEvent>,
    metrics: SessionMetrics,
    handle: Arc<SessionHandle>,
    mut commands: UnboundedReceiver<SessionCommand>,
) {
    let mut backoff = Backoff::default();
    let mut first_connection = true;

    loop {
        let mut client = match ApiClient::connect(
            &config.server_address,
            &config.token,
            config.insecure_plaintext,
        )
        .await
        {
            Ok(client) => client,
            Err(err) => {
                warn!(error = %err, "control plane connection failed");
                metrics.stream_errors_total.inc();
                match wait(&mut commands, backoff.next_delay()).await {
                    WaitOutcome::Shutdown => return,
                    WaitOutcome::Elapsed => continue,
                }
            }
        };

        let probe = proto::ProbeInfo {
            name: config.probe_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let mut stream = match client.get_changes(probe).await {
            Ok(stream) => stream,
            Err(status) => {
                warn!(%status, "opening the change stream failed");
                metrics.stream_errors_total.inc();
                match wait(&mut commands, backoff.next_delay()).await {
                    WaitOutcome::Shutdown => return,
                    WaitOutcome::Elapsed => continue,
                }
            }
        };

        backoff.reset();
        metrics.connects_total.inc();
        handle.set_client(Some(client));
        if first_connection {
            first_connection = false;
            handle.ready.store(true, Ordering::Relaxed);
            info!("control-plane session established");
            session_broadcast.broadcast(SessionEvent::Connected);
        } else {
            info!("control-plane session resumed");
            session_broadcast.broadcast(SessionEvent::StreamResumed);
        }

        let outcome = drive_stream(&mut stream, &check_publisher, &metrics, &mut commands).await;
        handle.set_client(None);
        match outcome {
            StreamOutcome::Shutdown => {
                info!("control-plane session shutting down");
                return;
            }
            StreamOutcome::Lost => {
                metrics.stream_errors_total.inc();
                session_broadcast.broadcast(SessionEvent::StreamLost);
                if let WaitOutcome::Shutdown = wait(&mut commands, backoff.next_delay()).await {
                    return;
                }
            }
            StreamOutcome::Disconnected => {
                info!(
                    pause_secs = DISCONNECT_PAUSE.as_secs(),
                    "disconnect requested, pausing before reconnect"
                );
                session_broadcast.broadcast(SessionEvent::StreamLost);
                if let WaitOutcome::Shutdown = wait(&mut commands, DISCONNECT_PAUSE).await {
                    return;
                }
            }
        }
    }
}

async fn drive_stream(
    stream: &mut Streaming<proto::ChangeEvent>,
    check_publisher: &EventPublisher<CheckEvent>,
    metrics: &SessionMetrics,
    commands: &mut UnboundedReceiver<SessionCommand>,
) -> StreamOutcome {
    loop {
        tokio::select! {
            message = stream.message() => match message {
                Ok(Some(event)) => dispatch(event, check_publisher, metrics),
                Ok(None) => {
                    warn!("change stream closed by the server");
                    return StreamOutcome::Lost;
                }
                Err(status) => {
                    warn!(%status, "change stream failed");
                    return StreamOutcome::Lost;
                }
            },
            command = commands.recv() => match command {
                Some(SessionCommand::Disconnect) => return StreamOutcome::Disconnected,
                Some(SessionCommand::Shutdown) | None => return StreamOutcome::Shutdown,
            },
        }
    }
}

/// Maps one wire event into the manager's event stream. A malformed check is
/// dropped with a counted reason; inside a snapshot only the malformed
/// entries are dropped, the snapshot itself still applies.
fn dispatch(
    event: proto::ChangeEvent,
    check_publisher: &EventPublisher<CheckEvent>,
    metrics: &SessionMetrics,
) {
    let Some(event) = event.event else {
        warn!("change event without payload");
        metrics.convert_errors_total.inc();
        return;
    };

    let (op, check_event) = match event {
        proto::change_event::Event::Add(check) => match Check::try_from(check) {
            Ok(check) => ("add", CheckEvent::Added(check)),
            Err(err) => {
                warn!(%err, "dropping malformed check add");
                metrics.convert_errors_total.inc();
                return;
            }
        },
        proto::change_event::Event::Update(check) => match Check::try_from(check) {
            Ok(check) => ("update", CheckEvent::Updated(check)),
            Err(err) => {
                warn!(%err, "dropping malformed check update");
                metrics.convert_errors_total.inc();
                return;
            }
        },
        proto::change_event::Event::Delete(check_id) => ("delete", CheckEvent::Deleted(check_id)),
        proto::change_event::Event::Snapshot(snapshot) => {
            let mut checks = Vec::with_capacity(snapshot.checks.len());
            for check in snapshot.checks {
                match Check::try_from(check) {
                    Ok(check) => checks.push(check),
                    Err(err) => {
                        warn!(%err, "dropping malformed check in snapshot");
                        metrics.convert_errors_total.inc();
                    }
                }
            }
            ("snapshot", CheckEvent::Snapshot(checks))
        }
    };

    metrics.events_total.with_label_values(&[op]).inc();
    debug!(op, "change event received");
    let _ = check_publisher.publish(check_event);
}

async fn wait(
    commands: &mut UnboundedReceiver<SessionCommand>,
    delay: Duration,
) -> WaitOutcome {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return WaitOutcome::Elapsed,
            command = commands.recv() => match command {
                // Already disconnected while waiting to reconnect.
                Some(SessionCommand::Disconnect) => continue,
                Some(SessionCommand::Shutdown) | None => return WaitOutcome::Shutdown,
            },
        }
    }
}
