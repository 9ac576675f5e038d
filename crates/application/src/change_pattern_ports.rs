use async_trait::async_trait;
use changeflow_core::AppResult;
use changeflow_domain::{ChangePattern, PatternId};

/// Repository port for persisted change patterns.
#[async_trait]
pub trait ChangePatternRepository: Send + Sync {
    /// Lists every stored pattern ordered by identifier.
    async fn list_patterns(&self) -> AppResult<Vec<ChangePattern>>;

    /// Returns one pattern by identifier.
    async fn find_pattern(&self, pattern_id: &PatternId) -> AppResult<Option<ChangePattern>>;

    /// Inserts or replaces one pattern.
    async fn save_pattern(&self, pattern: ChangePattern) -> AppResult<()>;

    /// Removes one pattern.
    async fn delete_pattern(&self, pattern_id: &PatternId) -> AppResult<()>;
}
