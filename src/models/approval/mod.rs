pub mod drafts;
pub mod editor;
pub mod progress;
pub mod queries;
pub mod resolver;
pub mod types;

pub use drafts::DraftRegistry;
pub use editor::{MoveDirection, PipelineEditor, StepEdit};
pub use progress::{blocking_step, evaluate, PipelineStatus, StepDecisions};
pub use resolver::{preview_pipeline, resolve_pipeline, resolve_step, Quorum, ResolvedStep, StepIssue, StepPreview};
pub use types::*;
