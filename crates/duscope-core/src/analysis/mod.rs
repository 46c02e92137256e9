/// Analysis building blocks: bounded top-K collection and folding rules.

pub mod fold;
pub mod top_k;

pub use fold::{is_skipped_extension, FoldRule, FoldRules};
pub use top_k::TopK;
