use crate::checks::model::CheckClass;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("tenant {tenant_id} is over its {check_class} check limit")]
pub struct OverLimitError {
    pub tenant_id: i64,
    pub check_class: CheckClass,
}

/// Per-tenant capacity oracle consulted before a scraper starts. Limits can
/// change at runtime; the oracle's owner emits [`crate::event::LimitEvent`]s
/// so the manager re-evaluates affected tenants.
pub trait TenantLimiter: Send + Sync {
    fn allows(&self, tenant_id: i64, check_class: CheckClass) -> Result<(), OverLimitError>;
}

/// The default oracle: everything is allowed.
pub struct UnlimitedTenants;

impl TenantLimiter for UnlimitedTenants {
    fn allows(&self, _tenant_id: i64, _check_class: CheckClass) -> Result<(), OverLimitError> {
        Ok(())
    }
}
