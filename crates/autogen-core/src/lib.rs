//! Autogen-Core: context assembly for HA AutoGen
//!
//! Turns a request and a registry snapshot into a bounded prompt, and turns
//! a backend reply back into document text.
//!
//! ## Key Components
//!
//! - `rank` / `BudgetPacker`: relevance ranking and size-bounded packing
//! - `PromptAssembler`: ordered prompt sections combined by a pure function
//! - `parse`: textual extraction of the document from a reply
//! - `SensitivePolicy`: flags documents touching high-risk domains
//! - `GenerationBackend`: the narrow contract every backend adapter implements

pub mod backend;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod fakes;
pub mod finding;
pub mod metrics;
pub mod obs;
pub mod parser;
pub mod prompt;
pub mod sensitive;
pub mod telemetry;

pub use backend::{Completion, GenerationBackend};
pub use config::{AutogenConfig, BudgetConfig};
pub use context::{
    context_window_for, rank, rank_inventory, BudgetPacker, BudgetPlan, ItemRef, PackedContext,
    RelevanceCandidate, RelevancePolicy, TokenEstimator,
};
pub use document::{DocumentKind, RequestKind};
pub use error::{BackendError, ConfigError, GenerationError, Result};
pub use finding::{Severity, ValidationFinding, ValidationStage};
pub use parser::{parse, ExtractedDocument, ExtractionSource, ParseError, ParseErrorReason};
pub use prompt::{Prompt, PromptAssembler, PromptRequest, PromptTemplate};
pub use sensitive::{SensitivePolicy, SensitivityReport};
