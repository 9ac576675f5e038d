//! Shared primitives for all Rust crates in Changeflow.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across Changeflow crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::fmt::Display for NonEmptyString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Stable error category exposed to presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Binding does not match its allocation type cardinality.
    Shape,
    /// Resource usage would exceed capacity.
    Capacity,
    /// Role parent cycle or task link cycle.
    CircularDependency,
    /// Reference to an entity absent from the snapshot.
    DanglingReference,
    /// Required field or uniqueness violation.
    Validation,
    /// Requested entity does not exist.
    NotFound,
    /// Write conflicts with existing state.
    Conflict,
    /// Internal unexpected error.
    Internal,
}

impl ErrorKind {
    /// Returns a stable storage value for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shape => "shape",
            Self::Capacity => "capacity",
            Self::CircularDependency => "circular_dependency",
            Self::DanglingReference => "dangling_reference",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Internal => "internal",
        }
    }
}

/// Common application error categories.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Task binding does not match its declared allocation type.
    #[error("shape error: {0}")]
    Shape(String),

    /// Resource usage would exceed exclusive or shared capacity.
    #[error("capacity error: {0}")]
    Capacity(String),

    /// Role parent chain or task next-link chain closes a cycle.
    #[error("circular dependency: {0}")]
    CircularDependency(String),

    /// Referenced role, resource, or task id does not resolve.
    #[error("dangling reference: {0}")]
    DanglingReference(String),

    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Several independent failures reported for one action.
    #[error("{count} errors: {joined}", count = .0.len(), joined = join_messages(.0))]
    Multiple(Vec<AppError>),
}

impl AppError {
    /// Collapses collected errors: none is success, one is returned as is.
    pub fn from_many(mut errors: Vec<AppError>) -> AppResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }

    /// Returns the stable category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Shape(_) => ErrorKind::Shape,
            Self::Capacity(_) => ErrorKind::Capacity,
            Self::CircularDependency(_) => ErrorKind::CircularDependency,
            Self::DanglingReference(_) => ErrorKind::DanglingReference,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Internal(_) => ErrorKind::Internal,
            Self::Multiple(errors) => errors
                .first()
                .map(Self::kind)
                .unwrap_or(ErrorKind::Internal),
        }
    }

    /// Prefixes the message of this error, or of every aggregated error.
    #[must_use]
    pub fn context(self, context: &str) -> Self {
        match self {
            Self::Shape(message) => Self::Shape(format!("{context}: {message}")),
            Self::Capacity(message) => Self::Capacity(format!("{context}: {message}")),
            Self::CircularDependency(message) => {
                Self::CircularDependency(format!("{context}: {message}"))
            }
            Self::DanglingReference(message) => {
                Self::DanglingReference(format!("{context}: {message}"))
            }
            Self::Validation(message) => Self::Validation(format!("{context}: {message}")),
            Self::NotFound(message) => Self::NotFound(format!("{context}: {message}")),
            Self::Conflict(message) => Self::Conflict(format!("{context}: {message}")),
            Self::Internal(message) => Self::Internal(format!("{context}: {message}")),
            Self::Multiple(errors) => Self::Multiple(
                errors
                    .into_iter()
                    .map(|error| error.context(context))
                    .collect(),
            ),
        }
    }

    /// Returns the individual errors, flattening nested aggregates.
    #[must_use]
    pub fn flatten(&self) -> Vec<&AppError> {
        match self {
            Self::Multiple(errors) => errors.iter().flat_map(Self::flatten).collect(),
            other => vec![other],
        }
    }
}

fn join_messages(errors: &[AppError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
