use crate::session::SessionHandle;
use crate::utils::threads::spawn_named_thread;
use actix_web::{web, App, HttpResponse, HttpServer};
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind HTTP server: {0}")]
    Bind(String),
    #[error("HTTP server thread failed during startup")]
    StartupChannelClosed,
}

/// What the admin endpoints need from the rest of the agent. Implemented by
/// the control-plane session handle; stubbed in tests.
pub trait StatusSource: Send + Sync + 'static {
    /// Sticky readiness: false until the first control-plane connection,
    /// true forever after.
    fn is_ready(&self) -> bool;

    /// Routes an operator disconnect request into the session loop.
    fn request_disconnect(&self);
}

impl StatusSource for SessionHandle {
    fn is_ready(&self) -> bool {
        SessionHandle::is_ready(self)
    }

    fn request_disconnect(&self) {
        SessionHandle::request_disconnect(self)
    }
}

struct AppState {
    source: Arc<dyn StatusSource>,
    registry: Registry,
}

async fn ready(state: web::Data<AppState>) -> HttpResponse {
    if state.source.is_ready() {
        HttpResponse::Ok().body("ready")
    } else {
        HttpResponse::ServiceUnavailable().body("not connected to the control plane")
    }
}

async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&state.registry.gather(), &mut buffer) {
        Ok(()) => HttpResponse::Ok()
            .content_type(encoder.format_type())
            .body(buffer),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

async fn disconnect(state: web::Data<AppState>) -> HttpResponse {
    info!("disconnect requested via admin endpoint");
    state.source.request_disconnect();
    HttpResponse::Ok().body("disconnecting\n")
}

fn app_config(config: &mut web::ServiceConfig) {
    config
        .route("/ready", web::get().to(ready))
        .route("/metrics", web::get().to(metrics))
        .route("/disconnect", web::post().to(disconnect));
}

/// The admin HTTP server (`/ready`, `/metrics`, `POST /disconnect`), running
/// on its own thread. A bind failure is reported synchronously so startup can
/// treat it as fatal.
pub struct StatusServer {
    server_handle: actix_web::dev::ServerHandle,
    thread: JoinHandle<()>,
}

impl StatusServer {
    pub fn start(
        listen_address: SocketAddr,
        source: Arc<dyn StatusSource>,
        registry: Registry,
    ) -> Result<Self, ServerError> {
        let (startup_sender, startup_receiver) = mpsc::channel();

        let thread = spawn_named_thread("status-server", move || {
            let system = actix_web::rt::System::new();
            system.block_on(async move {
                let state = web::Data::new(AppState { source, registry });
                let server = HttpServer::new(move || {
                    App::new().app_data(state.clone()).configure(app_config)
                })
                .workers(2)
                .bind(listen_address);

                let server = match server {
                    Ok(server) => server.run(),
                    Err(err) => {
                        let _ = startup_sender.send(Err(ServerError::Bind(err.to_string())));
                        return;
                    }
                };
                let _ = startup_sender.send(Ok(server.handle()));
                if let Err(err) = server.await {
                    warn!(error = %err, "status server terminated with an error");
                }
            });
        });

        match startup_receiver.recv() {
            Ok(Ok(server_handle)) => {
                info!(%listen_address, "status server listening");
                Ok(Self {
                    server_handle,
                    thread,
                })
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => Err(ServerError::StartupChannelClosed),
        }
    }

    pub fn stop(self) {
        futures::executor::block_on(self.server_handle.stop(true));
        if self.thread.join().is_err() {
            warn!("status server thread panicked");
        }
    }
}
