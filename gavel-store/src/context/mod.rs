//! Ambient operation context
//!
//! Carries tenant and actor identity for one logical unit of work (an HTTP
//! request, a background job, an explicit transaction body). The carrier is
//! established with [`scope`] and read back with [`current`]; it is never a
//! process-global. Concurrent units of work observe mutually exclusive
//! contexts even when multiplexed on the same worker threads.

mod middleware;
mod scope;

pub use middleware::{CurrentActor, propagate_context};
pub use scope::{current, current_tenant, scope, sync_scope};

use serde::{Deserialize, Serialize};

/// Identity and transport metadata for one logical unit of work.
///
/// Immutable once established for a scope; a nested scope shadows the outer
/// value instead of mutating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    /// Owning tenant. `None` for tenant-less work (platform operators,
    /// startup tasks); tenant-scoped entity types reject such operations.
    pub tenant_id: Option<String>,
    /// Authenticated identity performing the operation.
    pub actor_id: String,
    /// Client IP, as reported by the transport.
    pub ip_address: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// Correlation ID, generated when the transport does not supply one.
    pub request_id: String,
    /// Cross-tenant administrative capability. Required to set or change a
    /// row's tenant field; never granted implicitly.
    #[serde(default)]
    pub cross_tenant_admin: bool,
}

impl OperationContext {
    /// Context for `actor_id` with a fresh request id and no tenant.
    pub fn for_actor(actor_id: impl Into<String>) -> Self {
        Self {
            tenant_id: None,
            actor_id: actor_id.into(),
            ip_address: None,
            user_agent: None,
            request_id: uuid::Uuid::new_v4().to_string(),
            cross_tenant_admin: false,
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_cross_tenant_admin(mut self, allowed: bool) -> Self {
        self.cross_tenant_admin = allowed;
        self
    }
}
