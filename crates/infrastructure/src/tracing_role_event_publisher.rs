//! Role event publisher that writes events to tracing output.

use async_trait::async_trait;
use rolebind_application::RoleEventPublisher;
use rolebind_core::AppResult;
use rolebind_domain::RoleEvent;
use tracing::info;

/// Publisher that logs every role event at info level.
#[derive(Clone)]
pub struct TracingRoleEventPublisher;

impl TracingRoleEventPublisher {
    /// Creates a new tracing publisher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for TracingRoleEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleEventPublisher for TracingRoleEventPublisher {
    async fn publish(&self, event: RoleEvent) -> AppResult<()> {
        let binding = event.binding();
        info!(
            event = event.as_str(),
            assignable = %binding.assignable,
            roleable = %binding.roleable,
            role = binding.role.as_ref().map(|role| role.name()),
            role_key = %binding.role_key,
            "role event"
        );

        Ok(())
    }
}
