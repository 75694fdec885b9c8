// ============================================================================
// Modlift Library
// ============================================================================

pub mod core;
pub mod store;
pub mod steam;
pub mod files;
pub mod builds;
pub mod config;
pub mod lifecycle;
pub mod facade;
pub mod web;

// Re-export main types for convenience
pub use config::LifecycleConfig;
pub use core::{LifecycleError, ModStatus, Result, WorkshopModRecord};
pub use facade::LifecycleOrchestrator;

// Re-export the saga vocabulary
pub use lifecycle::{LifecycleEvent, SagaState, StepOutcome};
