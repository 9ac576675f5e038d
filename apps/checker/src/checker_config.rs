use std::env;
use std::path::PathBuf;

use changeflow_application::ServiceSettings;
use changeflow_core::{AppError, AppResult};
use changeflow_domain::{InheritanceMode, RoleDeletionPolicy};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerConfig {
    pub snapshot_path: PathBuf,
    pub settings: ServiceSettings,
    pub strict_connectivity: bool,
}

impl CheckerConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(env::args().nth(1), |name| env::var(name).ok())
    }

    pub fn from_lookup(
        path_argument: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> AppResult<Self> {
        let snapshot_path = path_argument
            .filter(|value| !value.trim().is_empty())
            .or_else(|| lookup("CHANGEFLOW_SNAPSHOT_PATH"))
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                AppError::Validation(
                    "CHANGEFLOW_SNAPSHOT_PATH is required when no path argument is given"
                        .to_owned(),
                )
            })?;

        let inheritance_mode = match lookup("CHANGEFLOW_INHERITANCE_MODE") {
            Some(value) => value
                .trim()
                .parse::<InheritanceMode>()
                .map_err(|error| error.context("CHANGEFLOW_INHERITANCE_MODE"))?,
            None => InheritanceMode::default(),
        };

        let deletion_policy = match lookup("CHANGEFLOW_ROLE_DELETION_POLICY") {
            Some(value) => value
                .trim()
                .parse::<RoleDeletionPolicy>()
                .map_err(|error| error.context("CHANGEFLOW_ROLE_DELETION_POLICY"))?,
            None => RoleDeletionPolicy::default(),
        };

        let strict_connectivity = match lookup("CHANGEFLOW_STRICT_CONNECTIVITY") {
            Some(value) => parse_bool("CHANGEFLOW_STRICT_CONNECTIVITY", value.as_str())?,
            None => false,
        };

        Ok(Self {
            snapshot_path,
            settings: ServiceSettings {
                inheritance_mode,
                deletion_policy,
            },
            strict_connectivity,
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_bool(name: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(AppError::Validation(format!(
            "invalid {name} value '{other}': expected true or false"
        ))),
    }
}
