/// Recommendation backend abstraction
///
/// A backend turns a user's ratings into ranked catalog items. Two implementations ship
/// with the crate: a matrix-factorization model (primary) and a small neural scorer
/// (secondary). Backends keep all per-user state private and behind their own locks,
/// which is what makes it safe to abandon one of their calls mid-flight.
use std::cmp::Ordering;
use std::sync::Arc;

use crate::{
    error::BackendError,
    models::{BackendChoice, CatalogEntry, RecommendationItem, UserId, UserRatings},
};

pub mod matrix_factorization;
pub mod neural;

pub use matrix_factorization::MatrixFactorizationBackend;
pub use neural::NeuralBackend;

/// Trait for recommendation backends
///
/// Calls are blocking and may be slow; callers run them through
/// `BoundedExecutor` rather than on an async worker.
#[cfg_attr(test, mockall::automock)]
pub trait RecommenderBackend: Send + Sync {
    /// Backend name for logging and item labels
    fn name(&self) -> &'static str;

    /// Lets the backend fold new preference signal in before inference
    fn update_user_ratings(&self, user_id: UserId, ratings: &UserRatings)
        -> Result<(), BackendError>;

    /// Returns at most `count` items, best first
    fn get_recommendations(
        &self,
        user_id: UserId,
        count: usize,
    ) -> Result<Vec<RecommendationItem>, BackendError>;
}

/// The pair of backends available to the orchestrator
#[derive(Clone)]
pub struct BackendSet {
    primary: Arc<dyn RecommenderBackend>,
    secondary: Arc<dyn RecommenderBackend>,
}

impl BackendSet {
    pub fn new(
        primary: Arc<dyn RecommenderBackend>,
        secondary: Arc<dyn RecommenderBackend>,
    ) -> Self {
        Self { primary, secondary }
    }

    /// Matrix factorization as primary, neural scorer as secondary
    pub fn standard() -> Self {
        Self::new(
            Arc::new(MatrixFactorizationBackend::new()),
            Arc::new(NeuralBackend::new()),
        )
    }

    pub fn get(&self, choice: BackendChoice) -> Arc<dyn RecommenderBackend> {
        match choice {
            BackendChoice::Primary => self.primary.clone(),
            BackendChoice::Secondary => self.secondary.clone(),
        }
    }

    /// Both backends, primary first
    pub fn all(&self) -> [(BackendChoice, Arc<dyn RecommenderBackend>); 2] {
        [
            (BackendChoice::Primary, self.primary.clone()),
            (BackendChoice::Secondary, self.secondary.clone()),
        ]
    }
}

/// Sorts scored entries best-first (ties broken by id) and keeps the top `count`
pub(crate) fn rank(
    mut scored: Vec<(&CatalogEntry, f64)>,
    count: usize,
    label: &str,
) -> Vec<RecommendationItem> {
    scored.sort_by(|(a, score_a), (b, score_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });

    scored
        .into_iter()
        .take(count)
        .map(|(entry, score)| RecommendationItem::from_entry(entry, score, label))
        .collect()
}

pub(crate) fn check_count(backend: &'static str, count: usize) -> Result<(), BackendError> {
    if count == 0 {
        return Err(BackendError::Computation {
            backend,
            reason: "requested count must be positive".to_string(),
        });
    }
    Ok(())
}

/// Small deterministic weight in [-scale, scale] derived from two indices
pub(crate) fn fixed_weight(row: usize, col: usize, scale: f64) -> f64 {
    let seed = (row as f64 + 1.0) * 12.9898 + (col as f64 + 1.0) * 78.233;
    let noise = (seed.sin() * 43_758.545_3).fract();
    (noise * 2.0 - 1.0).clamp(-1.0, 1.0) * scale
}
