use async_trait::async_trait;
use changeflow_core::AppResult;
use changeflow_domain::{Resource, ResourceId};

/// Repository port for persisted resources.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Lists every stored resource ordered by identifier.
    async fn list_resources(&self) -> AppResult<Vec<Resource>>;

    /// Returns one resource by identifier.
    async fn find_resource(&self, resource_id: &ResourceId) -> AppResult<Option<Resource>>;

    /// Inserts or replaces one resource.
    async fn save_resource(&self, resource: Resource) -> AppResult<()>;

    /// Removes one resource.
    async fn delete_resource(&self, resource_id: &ResourceId) -> AppResult<()>;
}
