//! The contract between the orchestrator and whatever brings resources up.

use apphost_common::error::LaunchError;
use apphost_common::types::Endpoint;
use apphost_compose::graph::Resource;
use apphost_compose::resolver::ResolvedConfiguration;
use async_trait::async_trait;

/// Starts and stops resources on behalf of the orchestrator.
///
/// Retry policy, if any, belongs to the implementation.
#[async_trait]
pub trait ResourceLauncher: Send + Sync {
    /// Brings `resource` up with its dependencies' endpoints and returns
    /// its own endpoint once it is ready.
    async fn start(
        &self,
        resource: &Resource,
        config: &ResolvedConfiguration,
    ) -> Result<Endpoint, LaunchError>;

    /// Stops a resource previously started by this launcher.
    async fn stop(&self, resource: &Resource) -> Result<(), LaunchError>;

    /// Reports whether a started resource is still alive.
    async fn is_alive(&self, _resource: &Resource) -> bool {
        true
    }
}
