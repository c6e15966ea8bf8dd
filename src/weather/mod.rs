//! Weather-specific processing: normalization, topic routing and synthesis.

pub mod normalize;
pub mod synthesize;
pub mod topic;

pub use normalize::normalize;
pub use synthesize::{SynthesisTable, Statistic, Synthesizer, WindowRoute};
pub use topic::TopicBuilder;
