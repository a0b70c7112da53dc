pub mod backends;
pub mod device;
pub mod executor;
pub mod recommendations;

pub use backends::{BackendSet, RecommenderBackend};
pub use device::{DeviceSession, InteractionRecorder, InteractionTiming, SharedDeviceState};
pub use executor::{BoundedExecutor, ExecutionFailure, ExecutionOutcome};
pub use recommendations::{
    ComparisonResponse, FallbackReason, OrchestratorConfig, RecommendationOrchestrator,
    RecommendationResponse, RecommendationSource,
};
