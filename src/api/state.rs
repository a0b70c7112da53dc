use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::services::{RecommendationOrchestrator, SharedDeviceState};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RecommendationOrchestrator>,
    pub device: SharedDeviceState,
    pub started_at: DateTime<Utc>,
    received: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(orchestrator: Arc<RecommendationOrchestrator>, device: SharedDeviceState) -> Self {
        Self {
            orchestrator,
            device,
            started_at: Utc::now(),
            received: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Counts an `/api/interact` call, including unknown types
    pub fn note_interaction(&self) -> u64 {
        self.received.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn interactions_received(&self) -> u64 {
        self.received.load(Ordering::Acquire)
    }
}
