//! Context assembly: relevance ranking, size budgets and packing.

pub mod budget;
pub mod packer;
pub mod relevance;

pub use budget::{
    context_window_for, resolve_context_window, BudgetPlan, TokenEstimator,
    CONTEXT_WINDOW_ENV, DEFAULT_CONTEXT_WINDOW,
};
pub use packer::{dropped_line_reserve, BudgetPacker, Detail, DroppedItems, PackedContext, PackedItem};
pub use relevance::{
    rank, rank_inventory, tokenize, ItemRef, RelevanceCandidate, RelevancePolicy,
    RelevanceWeights,
};
