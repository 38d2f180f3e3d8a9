use super::payload::{LogStream, TimeSeries};
use crate::tenant::RemoteDatasource;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteClientError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote returned status {0}")]
    Status(u16),
}

impl RemoteClientError {
    /// Transport failures and server-side/throttling statuses are worth
    /// retrying; other statuses mean the payload will never be accepted.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status(status) => *status >= 500 || *status == 429,
        }
    }
}

/// Delivery to one tenant remote. The concrete wire codecs live behind this
/// seam; the engine only cares about success, retryable failure, or permanent
/// failure.
pub trait RemoteClient: Send + Sync {
    fn send_metrics(
        &self,
        remote: &RemoteDatasource,
        series: &[TimeSeries],
    ) -> Result<(), RemoteClientError>;

    fn send_logs(
        &self,
        remote: &RemoteDatasource,
        streams: &[LogStream],
    ) -> Result<(), RemoteClientError>;
}

/// JSON-over-HTTP delivery with basic auth from the tenant datasource.
pub struct HttpRemoteClient {
    client: reqwest::blocking::Client,
}

impl HttpRemoteClient {
    pub fn new(timeout: Duration) -> Result<Self, RemoteClientError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RemoteClientError::Transport(err.to_string()))?;
        Ok(Self { client })
    }

    fn post<T: serde::Serialize + ?Sized>(
        &self,
        remote: &RemoteDatasource,
        body: &T,
    ) -> Result<(), RemoteClientError> {
        let response = self
            .client
            .post(&remote.url)
            .basic_auth(&remote.username, Some(remote.password.expose()))
            .json(body)
            .send()
            .map_err(|err| RemoteClientError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RemoteClientError::Status(status.as_u16()))
        }
    }
}

impl RemoteClient for HttpRemoteClient {
    fn send_metrics(
        &self,
        remote: &RemoteDatasource,
        series: &[TimeSeries],
    ) -> Result<(), RemoteClientError> {
        self.post(remote, series)
    }

    fn send_logs(
        &self,
        remote: &RemoteDatasource,
        streams: &[LogStream],
    ) -> Result<(), RemoteClientError> {
        self.post(remote, streams)
    }
}
