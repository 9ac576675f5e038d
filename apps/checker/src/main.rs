//! Changeflow snapshot checker.

#![forbid(unsafe_code)]

mod checker_config;
mod snapshot_check;

use changeflow_core::AppError;
use changeflow_infrastructure::JsonSnapshotFile;
use tracing::{error, info, warn};

use crate::checker_config::{CheckerConfig, init_tracing};
use crate::snapshot_check::check_snapshot;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = CheckerConfig::load()?;
    info!(
        path = %config.snapshot_path.display(),
        inheritance_mode = config.settings.inheritance_mode.as_str(),
        deletion_policy = config.settings.deletion_policy.as_str(),
        strict_connectivity = config.strict_connectivity,
        "checking snapshot"
    );

    let snapshot = JsonSnapshotFile::new(config.snapshot_path.clone())
        .load()
        .await?;
    let summary = check_snapshot(snapshot, config.settings, config.strict_connectivity).await?;

    for warning in &summary.warnings {
        warn!("{warning}");
    }
    for failure in &summary.failures {
        error!("{failure}");
    }

    if !summary.passed() {
        return Err(AppError::Validation(format!(
            "{} check(s) failed for '{}'",
            summary.failures.len(),
            config.snapshot_path.display()
        )));
    }

    Ok(())
}
