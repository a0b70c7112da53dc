/// Recommendation orchestration.
///
/// Every user action follows the same path: pick a backend, let the backends fold in
/// the user's ratings, invoke the chosen backend under a deadline, resolve the outcome
/// to either the backend's items or the fixed fallback list, and record exactly one
/// device interaction. No entry point returns an error; failures surface as a fallback
/// result with a status message.
///
/// One deadline covers the whole action. The rating pre-step may use at most half of
/// it and the invocation gets whatever is left, so a caller is never held much past
/// a single deadline even when both steps hang.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::{
    config::Config,
    error::BackendError,
    models::{
        catalog, BackendChoice, IndicatorMode, InteractionKind, RecommendationItem,
        RecommendationRequest, UserId, UserRatings,
    },
    services::{
        backends::{BackendSet, RecommenderBackend},
        device::InteractionRecorder,
        executor::{BoundedExecutor, ExecutionOutcome},
    },
};

/// Orchestrator tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Wall-clock budget for one user action, pre-step included
    pub deadline: Duration,
    /// Rating count at which the secondary backend takes over
    pub secondary_threshold: usize,
    /// Items returned when the caller does not ask for a count
    pub recommendation_count: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(8),
            secondary_threshold: 3,
            recommendation_count: 3,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            deadline: config.backend_deadline(),
            secondary_threshold: config.secondary_threshold,
            recommendation_count: config.recommendation_count,
        }
    }
}

/// Why a request ended on the fallback list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// No backends were configured
    NoBackend,
    /// The backend missed its deadline
    TimedOut,
    /// The backend raised an error or panicked
    Failed(String),
    /// The backend returned nothing
    Empty,
    /// The backend returned an item that cannot be displayed
    Malformed(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NoBackend => write!(f, "no recommendation backend available"),
            FallbackReason::TimedOut => write!(f, "backend timed out"),
            FallbackReason::Failed(reason) => write!(f, "backend failed: {}", reason),
            FallbackReason::Empty => write!(f, "backend returned no items"),
            FallbackReason::Malformed(reason) => write!(f, "backend returned bad data: {}", reason),
        }
    }
}

/// Where the items of a response came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecommendationSource {
    Backend {
        choice: BackendChoice,
        name: &'static str,
    },
    Fallback { reason: FallbackReason },
}

/// Result of one user action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationResponse {
    pub items: Vec<RecommendationItem>,
    pub status: String,
    pub source: RecommendationSource,
}

impl RecommendationResponse {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, RecommendationSource::Fallback { .. })
    }
}

/// Side-by-side output of both backends
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResponse {
    pub primary: RecommendationResponse,
    pub secondary: RecommendationResponse,
    pub status: String,
}

/// Drives backends on behalf of the presentation layers
pub struct RecommendationOrchestrator {
    backends: Option<BackendSet>,
    executor: BoundedExecutor,
    recorder: InteractionRecorder,
    config: OrchestratorConfig,
}

impl RecommendationOrchestrator {
    pub fn new(
        backends: Option<BackendSet>,
        executor: BoundedExecutor,
        recorder: InteractionRecorder,
        config: OrchestratorConfig,
    ) -> Self {
        if backends.is_none() {
            tracing::warn!("No recommendation backends configured; every request will use the fallback list");
        }
        Self {
            backends,
            executor,
            recorder,
            config,
        }
    }

    pub fn executor(&self) -> &BoundedExecutor {
        &self.executor
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn has_backends(&self) -> bool {
        self.backends.is_some()
    }

    /// Backend the threshold policy picks for a user with `ratings`
    pub fn select_backend(&self, ratings: &UserRatings) -> BackendChoice {
        BackendChoice::for_rating_count(ratings.len(), self.config.secondary_threshold)
    }

    pub async fn handle_voice(&self, user_id: UserId, ratings: &UserRatings) -> RecommendationResponse {
        self.handle_interaction(user_id, ratings, InteractionKind::Voice, BackendChoice::Primary)
            .await
    }

    pub async fn handle_tilt(&self, user_id: UserId, ratings: &UserRatings) -> RecommendationResponse {
        self.handle_interaction(user_id, ratings, InteractionKind::Tilt, BackendChoice::Secondary)
            .await
    }

    pub async fn handle_button(&self, user_id: UserId, ratings: &UserRatings) -> RecommendationResponse {
        self.handle_interaction(user_id, ratings, InteractionKind::Button, BackendChoice::Primary)
            .await
    }

    pub async fn handle_multi_sensory(
        &self,
        user_id: UserId,
        ratings: &UserRatings,
    ) -> RecommendationResponse {
        self.handle_interaction(
            user_id,
            ratings,
            InteractionKind::MultiSensory,
            BackendChoice::Primary,
        )
        .await
    }

    /// Plain recommendation request, backend chosen by rating count
    pub async fn handle_recommend(&self, user_id: UserId, ratings: &UserRatings) -> RecommendationResponse {
        self.handle_recommend_count(user_id, ratings, self.config.recommendation_count)
            .await
    }

    pub async fn handle_recommend_count(
        &self,
        user_id: UserId,
        ratings: &UserRatings,
        count: usize,
    ) -> RecommendationResponse {
        let request = RecommendationRequest {
            user_id,
            requested_count: count.max(1),
            backend_choice: self.select_backend(ratings),
        };
        let response = self.recommend(request, ratings, "Recommendations ready").await;
        self.emit(InteractionKind::Button, &response).await;
        response
    }

    /// Runs both backends on the same input and records a single comparison event
    pub async fn handle_comparison(&self, user_id: UserId, ratings: &UserRatings) -> ComparisonResponse {
        let request = |backend_choice| RecommendationRequest {
            user_id,
            requested_count: self.config.recommendation_count,
            backend_choice,
        };

        let primary = self
            .recommend(request(BackendChoice::Primary), ratings, "Primary model")
            .await;
        let secondary = self
            .recommend(request(BackendChoice::Secondary), ratings, "Secondary model")
            .await;

        self.recorder.record_comparison();
        let status = match (primary.is_fallback(), secondary.is_fallback()) {
            (false, false) => "Model comparison complete".to_string(),
            (true, true) => "Model comparison unavailable; showing popular titles".to_string(),
            _ => "Model comparison partially available".to_string(),
        };
        self.recorder.display(&status);

        ComparisonResponse {
            primary,
            secondary,
            status,
        }
    }

    /// Pushes new ratings into every backend and records the voice interaction that
    /// accompanies a rating session. Returns how many backends accepted the update.
    pub async fn handle_rating(&self, user_id: UserId, ratings: &UserRatings) -> usize {
        self.recorder.indicate(IndicatorMode::Processing);
        let accepted = match &self.backends {
            Some(backends) => {
                self.update_ratings(backends, user_id, ratings, self.config.deadline)
                    .await
            }
            None => 0,
        };

        self.recorder.record(InteractionKind::Voice).await;
        self.recorder.indicate(if accepted > 0 {
            IndicatorMode::Success
        } else {
            IndicatorMode::Error
        });
        tracing::info!(user_id, rating_count = ratings.len(), accepted, "Ratings submitted");
        accepted
    }

    async fn handle_interaction(
        &self,
        user_id: UserId,
        ratings: &UserRatings,
        kind: InteractionKind,
        backend_choice: BackendChoice,
    ) -> RecommendationResponse {
        let request = RecommendationRequest {
            user_id,
            requested_count: self.config.recommendation_count,
            backend_choice,
        };
        let label = match kind {
            InteractionKind::Voice => "Voice command processed",
            InteractionKind::Tilt => "Tilt gesture detected",
            InteractionKind::Button => "Button press registered",
            InteractionKind::MultiSensory => "Multi-sensory interaction complete",
        };

        let response = self.recommend(request, ratings, label).await;
        self.emit(kind, &response).await;
        response
    }

    /// Select, update, invoke and resolve; never records an interaction
    async fn recommend(
        &self,
        request: RecommendationRequest,
        ratings: &UserRatings,
        label: &str,
    ) -> RecommendationResponse {
        let Some(backends) = &self.backends else {
            return self.fallback(request, label, FallbackReason::NoBackend);
        };

        let started = Instant::now();
        self.recorder.indicate(IndicatorMode::Processing);
        if !ratings.is_empty() {
            self.update_ratings(backends, request.user_id, ratings, self.config.deadline / 2)
                .await;
        }
        let remaining = self.config.deadline.saturating_sub(started.elapsed());

        let backend = backends.get(request.backend_choice);
        let name = backend.name();
        let RecommendationRequest {
            user_id,
            requested_count,
            ..
        } = request;

        tracing::debug!(
            user_id,
            backend = name,
            choice = %request.backend_choice,
            count = requested_count,
            "Invoking recommendation backend"
        );

        let outcome = self
            .executor
            .run_with_deadline(
                move || backend.get_recommendations(user_id, requested_count),
                remaining,
            )
            .await;

        let resolved = match outcome {
            ExecutionOutcome::Success(items) => accept(items, requested_count),
            ExecutionOutcome::TimedOut => Err(FallbackReason::TimedOut),
            ExecutionOutcome::Failed(failure) => Err(FallbackReason::Failed(failure.to_string())),
        };

        match resolved {
            Ok(items) => {
                self.recorder.indicate(IndicatorMode::Success);
                tracing::info!(user_id, backend = name, items = items.len(), "Recommendations served");
                RecommendationResponse {
                    status: format!("{} ({})", label, name),
                    items,
                    source: RecommendationSource::Backend {
                        choice: request.backend_choice,
                        name,
                    },
                }
            }
            Err(reason) => self.fallback(request, label, reason),
        }
    }

    fn fallback(
        &self,
        request: RecommendationRequest,
        label: &str,
        reason: FallbackReason,
    ) -> RecommendationResponse {
        tracing::warn!(
            user_id = request.user_id,
            choice = %request.backend_choice,
            reason = %reason,
            "Serving fallback recommendations"
        );
        self.recorder.indicate(IndicatorMode::Error);

        let mut items = catalog::fallback_recommendations();
        items.truncate(request.requested_count.max(1));

        RecommendationResponse {
            status: format!("{} (popular titles: {})", label, reason),
            items,
            source: RecommendationSource::Fallback { reason },
        }
    }

    /// Best-effort update of both backends, run side by side within `budget`
    async fn update_ratings(
        &self,
        backends: &BackendSet,
        user_id: UserId,
        ratings: &UserRatings,
        budget: Duration,
    ) -> usize {
        let [(first_choice, first), (second_choice, second)] = backends.all();
        let (a, b) = tokio::join!(
            self.update_one(first_choice, first, user_id, ratings.clone(), budget),
            self.update_one(second_choice, second, user_id, ratings.clone(), budget),
        );
        usize::from(a) + usize::from(b)
    }

    async fn update_one(
        &self,
        choice: BackendChoice,
        backend: Arc<dyn RecommenderBackend>,
        user_id: UserId,
        ratings: UserRatings,
        budget: Duration,
    ) -> bool {
        let name = backend.name();
        let outcome = self
            .executor
            .run_with_deadline(
                move || backend.update_user_ratings(user_id, &ratings),
                budget,
            )
            .await;

        match outcome {
            ExecutionOutcome::Success(()) => true,
            ExecutionOutcome::TimedOut => {
                tracing::warn!(user_id, backend = name, choice = %choice, "Rating update timed out");
                false
            }
            ExecutionOutcome::Failed(failure) => {
                tracing::warn!(
                    user_id,
                    backend = name,
                    choice = %choice,
                    error = %failure,
                    "Rating update failed"
                );
                false
            }
        }
    }

    async fn emit(&self, kind: InteractionKind, response: &RecommendationResponse) {
        self.recorder.display(&response.status);
        self.recorder.record(kind).await;
    }
}

/// Accepts a backend result if it is non-empty and every item can be displayed
fn accept(
    mut items: Vec<RecommendationItem>,
    count: usize,
) -> Result<Vec<RecommendationItem>, FallbackReason> {
    if items.is_empty() {
        return Err(FallbackReason::Empty);
    }
    if let Some(error) = items.iter().find_map(|item| item.validate().err()) {
        return Err(FallbackReason::Malformed(
            BackendError::InvalidOutput(error).to_string(),
        ));
    }
    items.truncate(count);
    Ok(items)
}
