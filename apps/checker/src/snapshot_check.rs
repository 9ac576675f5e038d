use std::sync::Arc;

use changeflow_application::{
    ChangePatternService, ResourceService, RoleService, ServiceSettings, Snapshot,
};
use changeflow_core::AppResult;
use changeflow_infrastructure::{
    InMemoryChangePatternRepository, InMemoryResourceRepository, InMemoryRoleRepository,
};
use tracing::{debug, info, warn};

/// Outcome of one checker run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub roles: usize,
    pub resources: usize,
    pub change_patterns: usize,
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
}

impl CheckSummary {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Seeds an in-memory store with `snapshot` and runs every validator over it.
pub async fn check_snapshot(
    snapshot: Snapshot,
    settings: ServiceSettings,
    strict_connectivity: bool,
) -> AppResult<CheckSummary> {
    let role_repository = Arc::new(InMemoryRoleRepository::new());
    let resource_repository = Arc::new(InMemoryResourceRepository::new());
    let pattern_repository = Arc::new(InMemoryChangePatternRepository::new());

    snapshot
        .seed(
            role_repository.as_ref(),
            resource_repository.as_ref(),
            pattern_repository.as_ref(),
        )
        .await?;

    let role_service = RoleService::new(role_repository.clone(), settings);
    let resource_service =
        ResourceService::new(resource_repository.clone(), pattern_repository.clone());
    let pattern_service =
        ChangePatternService::new(pattern_repository, role_repository, resource_repository);

    let mut summary = CheckSummary::default();

    let roles = role_service.list_roles().await?;
    summary.roles = roles.len();
    if let Err(error) = role_service.validate_hierarchy().await {
        summary.failures.push(format!("roles: {error}"));
    } else {
        for role in &roles {
            let flattened = role_service.flattened_permissions(role.id()).await?;
            debug!(
                role_id = %role.id(),
                permissions = flattened.len(),
                "{}",
                flattened.join(", ")
            );
        }
    }

    summary.resources = resource_service.list_resources().await?.len();

    let patterns = pattern_service.list_patterns().await?;
    summary.change_patterns = patterns.len();
    for pattern in &patterns {
        match pattern_service.validate_pattern(pattern.id()).await {
            Ok(report) => {
                let warnings = report.warnings();
                if strict_connectivity && !warnings.is_empty() {
                    summary.failures.extend(
                        warnings
                            .iter()
                            .map(|warning| format!("pattern '{}': {warning}", pattern.id())),
                    );
                } else {
                    summary.warnings.extend(
                        warnings
                            .iter()
                            .map(|warning| format!("pattern '{}': {warning}", pattern.id())),
                    );
                }

                for (resource_id, status) in pattern_service.resource_statuses(pattern.id()).await? {
                    debug!(
                        pattern_id = %pattern.id(),
                        resource_id = %resource_id,
                        status = status.as_str(),
                        "resource status"
                    );
                }
            }
            Err(error) => {
                for failure in error.flatten() {
                    summary
                        .failures
                        .push(format!("pattern '{}': {failure}", pattern.id()));
                }
            }
        }
    }

    if summary.passed() {
        info!(
            roles = summary.roles,
            resources = summary.resources,
            change_patterns = summary.change_patterns,
            warnings = summary.warnings.len(),
            "snapshot passed"
        );
    } else {
        warn!(
            failures = summary.failures.len(),
            warnings = summary.warnings.len(),
            "snapshot failed"
        );
    }

    Ok(summary)
}
