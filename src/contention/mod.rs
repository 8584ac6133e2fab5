//! Contention detection and grouping
//!
//! Detects which resources are over-subscribed, derives the agent–agent
//! contention graph, and partitions agents into resource-conserving
//! groups under the configured grouping policy.

pub mod detector;
pub mod grouping;
pub mod split;

pub use detector::{build_graph, detect_contentions, Contention, ContentionGraph};
pub use grouping::{
    form_groups, CompatibilityMatrix, ContentionGroup, GroupingPolicy, SplitStrategy,
};
