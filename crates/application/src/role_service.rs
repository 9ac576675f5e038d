use std::sync::Arc;

use changeflow_core::{AppError, AppResult};
use changeflow_domain::{
    Role, RoleDeletionPolicy, RoleHierarchy, RoleId, RoleInput, RolePermissions, RoleTreeNode,
};
use tracing::{info, warn};

use crate::{RoleRepository, ServiceSettings};

/// Application service for role administration and permission queries.
#[derive(Clone)]
pub struct RoleService {
    repository: Arc<dyn RoleRepository>,
    settings: ServiceSettings,
}

impl RoleService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(repository: Arc<dyn RoleRepository>, settings: ServiceSettings) -> Self {
        Self {
            repository,
            settings,
        }
    }

    /// Loads every stored role as one hierarchy snapshot.
    pub async fn load_hierarchy(&self) -> AppResult<RoleHierarchy> {
        Ok(RoleHierarchy::from_roles(self.repository.list_roles().await?))
    }

    /// Lists stored roles.
    pub async fn list_roles(&self) -> AppResult<Vec<Role>> {
        self.repository.list_roles().await
    }

    /// Returns one role or fails when it does not exist.
    pub async fn find_role(&self, role_id: &RoleId) -> AppResult<Role> {
        self.repository
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))
    }

    /// Validates a role against the stored hierarchy and persists it.
    pub async fn save_role(&self, input: RoleInput) -> AppResult<Role> {
        let role = Role::new(input)?;
        let mut hierarchy = self.load_hierarchy().await?;

        if let Err(error) = hierarchy.create_or_update_role(role.clone()) {
            warn!(role_id = %role.id(), error = %error, "role rejected");
            return Err(error);
        }

        self.repository.save_role(role.clone()).await?;
        info!(
            role_id = %role.id(),
            parent_role_id = role.parent_role_id().map(RoleId::as_str),
            "role saved"
        );

        Ok(role)
    }

    /// Deletes a role using the configured deletion policy.
    pub async fn delete_role(&self, role_id: &RoleId) -> AppResult<Role> {
        self.delete_role_with_policy(role_id, self.settings.deletion_policy)
            .await
    }

    /// Deletes a role and persists every role the deletion touched.
    pub async fn delete_role_with_policy(
        &self,
        role_id: &RoleId,
        policy: RoleDeletionPolicy,
    ) -> AppResult<Role> {
        let before = self.load_hierarchy().await?;
        let mut after = before.clone();
        let removed = after.delete_role(role_id, policy)?;

        self.repository.delete_role(role_id).await?;

        let mut touched = 0_usize;
        for role in after.roles() {
            if before.get(role.id()) != Some(role) {
                self.repository.save_role(role.clone()).await?;
                touched += 1;
            }
        }

        info!(
            role_id = %role_id,
            policy = policy.as_str(),
            touched,
            "role deleted"
        );

        Ok(removed)
    }

    /// Returns the direct and inherited permissions of a role.
    pub async fn permissions(&self, role_id: &RoleId) -> AppResult<RolePermissions> {
        self.load_hierarchy()
            .await?
            .permissions(role_id, self.settings.inheritance_mode)
    }

    /// Returns sorted `resource:action` strings of a role's effective grants.
    pub async fn flattened_permissions(&self, role_id: &RoleId) -> AppResult<Vec<String>> {
        self.load_hierarchy()
            .await?
            .flattened_permissions(role_id, self.settings.inheritance_mode)
    }

    /// Returns the role forest.
    pub async fn hierarchy_tree(&self) -> AppResult<Vec<RoleTreeNode>> {
        Ok(self.load_hierarchy().await?.build_hierarchy_tree())
    }

    /// Checks the stored hierarchy for cycles and dangling references.
    pub async fn validate_hierarchy(&self) -> AppResult<()> {
        let hierarchy = self.load_hierarchy().await?;
        let result = hierarchy.validate();

        match &result {
            Ok(()) => info!(roles = hierarchy.len(), "role hierarchy is consistent"),
            Err(error) => warn!(roles = hierarchy.len(), error = %error, "role hierarchy is inconsistent"),
        }

        result
    }

    /// Returns whether two roles declare each other mutually exclusive.
    pub async fn are_mutually_exclusive(&self, left: &RoleId, right: &RoleId) -> AppResult<bool> {
        Ok(self
            .load_hierarchy()
            .await?
            .are_mutually_exclusive(left, right))
    }

    /// Fails when `member_count` exceeds the role's membership cap.
    pub async fn check_member_count(&self, role_id: &RoleId, member_count: u32) -> AppResult<()> {
        self.load_hierarchy()
            .await?
            .check_member_count(role_id, member_count)
    }
}
