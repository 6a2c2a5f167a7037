//! Autogen-Pipeline: validation and repair for HA AutoGen
//!
//! Provides the path from a backend reply to a deployable document:
//! - Five ordered validation stages against a pinned registry snapshot
//! - A bounded repair loop that feeds findings back into the prompt
//! - A handoff gate that holds sensitive documents until confirmed
//! - Deterministic review rules for documents the user already has

pub mod gate;
pub mod generate;
pub mod pipeline;
pub mod repair;
pub mod review;
pub mod stages;

// Re-export key types
pub use gate::{Confirmation, HandoffGate, HandoffRefusal, ReleasedDocument, ValidatedDocument};
pub use generate::{GenerationPipeline, GenerationReport, PreparedContext};
pub use pipeline::{ValidationPipeline, ValidationReport};
pub use repair::{
    AttemptOutcome, AttemptRecord, GenerationAttempt, LoopState, RepairLog, RepairLoop,
    RepairPolicy, RepairRun,
};
pub use review::{ReviewCategory, ReviewFinding, ReviewRules, ReviewSeverity};
