use crate::checks::secret::Secret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod cache;

/// Routing credentials for one remote destination (metrics or logs).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteDatasource {
    pub name: String,
    pub url: String,
    pub username: String,
    pub password: Secret,
}

/// Reference to the secret store holding this tenant's credentials. When
/// `expiry` is set (epoch seconds), cached tenant data must not outlive it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretStore {
    pub url: String,
    pub token: Secret,
    pub expiry: Option<f64>,
}

/// The customer owning a set of checks; the routing target for everything
/// those checks emit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tenant {
    pub id: i64,
    pub metrics_remote: Option<RemoteDatasource>,
    pub logs_remote: Option<RemoteDatasource>,
    pub secret_store: Option<SecretStore>,
    pub omit_label_prefix: bool,
    /// Version stamp, seconds since epoch. Higher wins on push updates.
    pub modified: f64,
}

#[derive(Debug, Error)]
pub enum TenantProviderError {
    #[error("control plane not connected")]
    NotConnected,
    #[error("tenant lookup failed: {0}")]
    Lookup(String),
}

/// The upstream source of tenant descriptors, implemented by the
/// control-plane session and mocked in tests.
pub trait TenantProvider: Send + Sync {
    fn get_tenant(&self, tenant_id: i64, timeout: Duration)
        -> Result<Tenant, TenantProviderError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub TenantProvider {}

        impl TenantProvider for TenantProvider {
            fn get_tenant(
                &self,
                tenant_id: i64,
                timeout: Duration,
            ) -> Result<Tenant, TenantProviderError>;
        }
    }

    /// A tenant with both remotes populated, reused across module tests.
    pub fn routable_tenant(id: i64, modified: f64) -> Tenant {
        Tenant {
            id,
            metrics_remote: Some(RemoteDatasource {
                name: "prom".to_string(),
                url: "https://prom.example.org/api/v1/write".to_string(),
                username: "123".to_string(),
                password: Secret::new("metrics-key"),
            }),
            logs_remote: Some(RemoteDatasource {
                name: "loki".to_string(),
                url: "https://loki.example.org/loki/api/v1/push".to_string(),
                username: "456".to_string(),
                password: Secret::new("logs-key"),
            }),
            secret_store: None,
            omit_label_prefix: false,
            modified,
        }
    }

    #[test]
    fn tenant_serialization_redacts_passwords() {
        let tenant = routable_tenant(1, 1.0);
        let json = serde_json::to_string(&tenant).unwrap();
        assert!(!json.contains("metrics-key"));
        assert!(!json.contains("logs-key"));
        assert!(json.contains("<encrypted>"));
    }
}
