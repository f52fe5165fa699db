pub mod analysis;
pub mod finalize;
pub mod prompts;
pub mod recommendation;

pub use analysis::{AnalysisTask, analyze};
pub use finalize::FinalizeTask;
pub use recommendation::{RecommendationTask, recommend};
