use std::collections::HashMap;

use async_trait::async_trait;
use changeflow_application::ChangePatternRepository;
use changeflow_core::{AppError, AppResult};
use changeflow_domain::{ChangePattern, PatternId};
use tokio::sync::RwLock;

/// In-memory change pattern repository implementation.
#[derive(Debug, Default)]
pub struct InMemoryChangePatternRepository {
    patterns: RwLock<HashMap<PatternId, ChangePattern>>,
}

impl InMemoryChangePatternRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChangePatternRepository for InMemoryChangePatternRepository {
    async fn list_patterns(&self) -> AppResult<Vec<ChangePattern>> {
        let mut patterns: Vec<ChangePattern> =
            self.patterns.read().await.values().cloned().collect();
        patterns.sort_by(|left, right| left.id().cmp(right.id()));
        Ok(patterns)
    }

    async fn find_pattern(&self, pattern_id: &PatternId) -> AppResult<Option<ChangePattern>> {
        Ok(self.patterns.read().await.get(pattern_id).cloned())
    }

    async fn save_pattern(&self, pattern: ChangePattern) -> AppResult<()> {
        let mut patterns = self.patterns.write().await;

        if let Some(stored) = patterns.get(pattern.id())
            && stored.last_modified() > pattern.last_modified()
        {
            return Err(AppError::Conflict(format!(
                "pattern '{}' was modified at {} after this copy",
                pattern.id(),
                stored.last_modified().to_rfc3339()
            )));
        }

        patterns.insert(pattern.id().clone(), pattern);
        Ok(())
    }

    async fn delete_pattern(&self, pattern_id: &PatternId) -> AppResult<()> {
        self.patterns
            .write()
            .await
            .remove(pattern_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("pattern '{pattern_id}' does not exist")))
    }
}
