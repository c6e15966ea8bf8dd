//! The cancellable source → transform → publish pipeline.
//!
//! Each stage runs on its own thread and talks to its neighbours over
//! unbuffered conduits, so a slow broker backs pressure all the way up to the
//! sensor source. A single [`Shutdown`] is shared by every stage.

pub mod shutdown;
pub mod sink;
pub mod source;
pub mod stage;
pub mod supervisor;
pub mod transform;

pub use shutdown::Shutdown;
pub use sink::PublishStage;
pub use source::{SourceInput, SourceStage};
pub use stage::{Stage, StageReport};
pub use supervisor::Pipeline;
pub use transform::WeatherStage;
