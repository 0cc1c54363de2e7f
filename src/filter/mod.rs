//! Ad/tracker filtering for proxied HTML

pub mod engine;
pub mod markup;

pub use engine::{BlockRuleEngine, LazyEngine, ResourceKind, RuleSource};
pub use markup::{FilterOutcome, MarkupFilter};
