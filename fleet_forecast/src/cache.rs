//! Memoization of training runs for interactive front ends
//!
//! Training is deterministic for identical inputs, so a result can be reused
//! whenever the model chain, the dataset content, the test window and the model
//! settings all match.

use crate::error::Result;
use crate::models::ModelKind;
use crate::pipeline::{run_on_dataset, PipelineResult, TrainingRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    candidates: Vec<ModelKind>,
    content_hash: u64,
    test_days: usize,
    settings: String,
}

/// Cache of pipeline results keyed by dataset content
#[derive(Debug, Default)]
pub struct TrainingCache {
    results: HashMap<CacheKey, Arc<PipelineResult>>,
    hits: usize,
}

impl TrainingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached result for this request, training on a miss.
    ///
    /// Failed runs are not cached.
    pub fn get_or_train(&mut self, request: &TrainingRequest) -> Result<Arc<PipelineResult>> {
        let candidates = request.candidates()?;
        let dataset = request.load()?;

        let key = CacheKey {
            candidates: candidates.clone(),
            content_hash: dataset.content_hash(),
            test_days: request.test_days(),
            settings: serde_json::to_string(request.config())?,
        };

        if let Some(result) = self.results.get(&key) {
            self.hits += 1;
            debug!(model = %result.model_name, "Training cache hit");
            return Ok(Arc::clone(result));
        }

        let result = Arc::new(run_on_dataset(request, &candidates, dataset)?);
        self.results.insert(key, Arc::clone(&result));
        Ok(result)
    }

    /// Lookups answered from the cache
    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.hits = 0;
    }
}
