use super::proto;
use crate::checks::secret::Secret;
use http::uri::PathAndQuery;
use std::time::Duration;
use thiserror::Error;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::InterceptedService;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::Interceptor;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Request, Status, Streaming};

/// Client keep-alive ping interval. Pings are permitted without active
/// streams because the change stream is idle between updates.
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(90);
/// Per-ping timeout before the connection is considered dead.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(30);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const GET_CHANGES_PATH: &str = "/synthetic_monitoring.Checks/GetChanges";
const GET_TENANT_PATH: &str = "/synthetic_monitoring.Tenants/GetTenant";
const PUSH_TELEMETRY_PATH: &str = "/synthetic_monitoring.Telemetry/PushTelemetry";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid api server address: {0}")]
    InvalidAddress(String),
    #[error("api token is not valid header material")]
    InvalidToken,
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Attaches the probe's bearer token to every RPC.
#[derive(Clone)]
pub struct AuthInterceptor {
    token: MetadataValue<Ascii>,
}

impl AuthInterceptor {
    fn new(token: &Secret) -> Result<Self, ClientError> {
        let token = format!("Bearer {}", token.expose())
            .parse()
            .map_err(|_| ClientError::InvalidToken)?;
        Ok(Self { token })
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request
            .metadata_mut()
            .insert("authorization", self.token.clone());
        Ok(request)
    }
}

pub type ClientTransport = InterceptedService<Channel, AuthInterceptor>;

/// Hand-written gRPC client for the control-plane API: the change stream,
/// tenant lookups, and telemetry pushes, all authenticated per-RPC.
#[derive(Clone)]
pub struct ApiClient {
    inner: Grpc<ClientTransport>,
}

impl ApiClient {
    /// Dials the API server. TLS is the default; plaintext requires the
    /// explicit opt-in flag.
    pub async fn connect(
        server_address: &str,
        token: &Secret,
        insecure_plaintext: bool,
    ) -> Result<Self, ClientError> {
        let scheme = if insecure_plaintext { "http" } else { "https" };
        let mut endpoint = Endpoint::from_shared(format!("{scheme}://{server_address}"))
            .map_err(|err| ClientError::InvalidAddress(err.to_string()))?
            .connect_timeout(CONNECT_TIMEOUT)
            .http2_keep_alive_interval(HEALTH_INTERVAL)
            .keep_alive_timeout(HEALTH_TIMEOUT)
            .keep_alive_while_idle(true);
        if !insecure_plaintext {
            endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
        }
        let channel = endpoint.connect().await?;
        let interceptor = AuthInterceptor::new(token)?;
        let inner = Grpc::new(InterceptedService::new(channel, interceptor));
        Ok(Self { inner })
    }

    pub async fn get_changes(
        &mut self,
        probe: proto::ProbeInfo,
    ) -> Result<Streaming<proto::ChangeEvent>, Status> {
        self.ready().await?;
        let codec: ProstCodec<proto::ProbeInfo, proto::ChangeEvent> = ProstCodec::default();
        let path = PathAndQuery::from_static(GET_CHANGES_PATH);
        Ok(self
            .inner
            .server_streaming(Request::new(probe), path, codec)
            .await?
            .into_inner())
    }

    /// Unary tenant lookup under the caller's deadline.
    pub async fn get_tenant(
        &mut self,
        info: proto::TenantInfo,
        timeout: Duration,
    ) -> Result<proto::Tenant, Status> {
        self.ready().await?;
        let codec: ProstCodec<proto::TenantInfo, proto::Tenant> = ProstCodec::default();
        let path = PathAndQuery::from_static(GET_TENANT_PATH);
        let mut request = Request::new(info);
        request.set_timeout(timeout);
        Ok(self.inner.unary(request, path, codec).await?.into_inner())
    }

    pub async fn push_telemetry(
        &mut self,
        telemetry: proto::RegionTelemetry,
    ) -> Result<proto::PushTelemetryResponse, Status> {
        self.ready().await?;
        let codec: ProstCodec<proto::RegionTelemetry, proto::PushTelemetryResponse> =
            ProstCodec::default();
        let path = PathAndQuery::from_static(PUSH_TELEMETRY_PATH);
        Ok(self
            .inner
            .unary(Request::new(telemetry), path, codec)
            .await?
            .into_inner())
    }

    async fn ready(&mut self) -> Result<(), Status> {
        self.inner
            .ready()
            .await
            .map_err(|err| Status::unknown(format!("service was not ready: {err}")))
    }
}
