use changeflow_core::AppResult;
use changeflow_domain::{ChangePattern, Resource, Role};
use serde::{Deserialize, Serialize};

use crate::{ChangePatternRepository, ResourceRepository, RoleRepository};

/// Persisted store contents exchanged with external tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Stored roles.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Stored resources.
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// Stored change patterns.
    #[serde(default, alias = "changePatterns")]
    pub change_patterns: Vec<ChangePattern>,
}

impl Snapshot {
    /// Writes every record into the repositories as stored, without validation.
    pub async fn seed(
        self,
        roles: &dyn RoleRepository,
        resources: &dyn ResourceRepository,
        patterns: &dyn ChangePatternRepository,
    ) -> AppResult<()> {
        for role in self.roles {
            roles.save_role(role).await?;
        }
        for resource in self.resources {
            resources.save_resource(resource).await?;
        }
        for pattern in self.change_patterns {
            patterns.save_pattern(pattern).await?;
        }

        Ok(())
    }
}
