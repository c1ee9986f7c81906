//! Visit Workflow
//!
//! The stage state machine that routes a patient visit through the hospital
//! departments, plus the read-only queue projections each department
//! dashboard consumes. All stage/status mutations go through
//! [`apply_action`]; the queue projector never decides legality.

mod engine;
mod queue;
mod stage;
mod visit;

#[cfg(feature = "database")]
mod repository;

pub use engine::{apply_action, Applied, VisitAction};
pub use queue::{project_queue, sort_queue, QueueEntry};
pub use stage::{LabPriority, OverallStatus, Stage, StageStatus};
pub use visit::Visit;

#[cfg(feature = "database")]
pub use repository::{QueueRepository, TransitionEngine, VisitRepository};
