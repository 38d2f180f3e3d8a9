use super::{Tenant, TenantProvider, TenantProviderError};
use crate::utils::time::remaining_until;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TenantCacheError {
    /// Cache miss and the upstream lookup failed: the tenant cannot be
    /// resolved at all right now. Data routed to it must be dropped.
    #[error("tenant {tenant_id} unresolved: {source}")]
    Unresolved {
        tenant_id: i64,
        #[source]
        source: TenantProviderError,
    },
}

#[derive(Default)]
struct TenantSlot {
    tenant: Option<Tenant>,
    valid_until: Option<Instant>,
}

/// Read-through cache of tenant descriptors with bounded freshness.
///
/// Locking is two-phase: the map lock is held only to find or create the
/// per-tenant slot, then released before the slot lock is taken. A slow
/// upstream fetch therefore stalls callers of the same tenant (no thundering
/// herd) but never unrelated tenants (no global bottleneck).
///
/// When the upstream errors and a previously fetched value exists, the stale
/// value is returned without error: routing with yesterday's credentials
/// beats dropping data.
pub struct TenantCache {
    provider: Arc<dyn TenantProvider>,
    ttl: Duration,
    slots: RwLock<HashMap<i64, Arc<Mutex<TenantSlot>>>>,
}

impl TenantCache {
    pub fn new(provider: Arc<dyn TenantProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: i64, timeout: Duration) -> Result<Tenant, TenantCacheError> {
        let slot = self.slot(tenant_id);
        // Only this tenant's slot is held across the upstream call.
        let mut slot = slot.lock().expect("tenant slot lock poisoned");

        if let (Some(tenant), Some(valid_until)) = (&slot.tenant, slot.valid_until) {
            if valid_until > Instant::now() {
                return Ok(tenant.clone());
            }
        }

        match self.provider.get_tenant(tenant_id, timeout) {
            Ok(tenant) => {
                slot.valid_until = Some(Instant::now() + self.effective_ttl(&tenant));
                slot.tenant = Some(tenant.clone());
                Ok(tenant)
            }
            Err(err) => match &slot.tenant {
                Some(stale) => {
                    debug!(tenant_id, error = %err, "tenant refresh failed, serving stale entry");
                    Ok(stale.clone())
                }
                None => Err(TenantCacheError::Unresolved {
                    tenant_id,
                    source: err,
                }),
            },
        }
    }

    /// Out-of-band tenant update pushed by the control plane. Replaces the
    /// cached value only when it is not older than what we already have.
    pub fn update(&self, tenant: Tenant) {
        let slot = self.slot(tenant.id);
        let mut slot = slot.lock().expect("tenant slot lock poisoned");
        if let Some(existing) = &slot.tenant {
            if tenant.modified < existing.modified {
                warn!(
                    tenant_id = tenant.id,
                    "ignoring tenant update older than the cached entry"
                );
                return;
            }
        }
        slot.valid_until = Some(Instant::now() + self.effective_ttl(&tenant));
        slot.tenant = Some(tenant);
    }

    fn slot(&self, tenant_id: i64) -> Arc<Mutex<TenantSlot>> {
        {
            let slots = self.slots.read().expect("tenant map lock poisoned");
            if let Some(slot) = slots.get(&tenant_id) {
                return Arc::clone(slot);
            }
        }
        let mut slots = self.slots.write().expect("tenant map lock poisoned");
        Arc::clone(slots.entry(tenant_id).or_default())
    }

    /// The freshness bound: the configured TTL, shortened by the secret
    /// store expiry when one is set.
    fn effective_ttl(&self, tenant: &Tenant) -> Duration {
        match tenant.secret_store.as_ref().and_then(|store| store.expiry) {
            Some(expiry) => self.ttl.min(remaining_until(expiry)),
            None => self.ttl,
        }
    }
}
