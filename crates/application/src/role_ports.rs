use async_trait::async_trait;
use changeflow_core::AppResult;
use changeflow_domain::{Role, RoleId};

/// Repository port for persisted roles.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Lists every stored role ordered by identifier.
    async fn list_roles(&self) -> AppResult<Vec<Role>>;

    /// Returns one role by identifier.
    async fn find_role(&self, role_id: &RoleId) -> AppResult<Option<Role>>;

    /// Inserts or replaces one role.
    async fn save_role(&self, role: Role) -> AppResult<()>;

    /// Removes one role.
    async fn delete_role(&self, role_id: &RoleId) -> AppResult<()>;
}
