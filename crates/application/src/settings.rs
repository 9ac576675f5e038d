use changeflow_domain::{InheritanceMode, RoleDeletionPolicy};

/// Policies shared by the application services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Direction in which permissions flow through the role hierarchy.
    pub inheritance_mode: InheritanceMode,
    /// What happens to the children of a deleted role.
    pub deletion_policy: RoleDeletionPolicy,
}
