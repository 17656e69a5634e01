//! Domain models for the orchestration engine.
//!
//! Every aggregate carries an opaque UUID identifier and, except for the
//! Global Context singleton, an `owner_user_id` foreign reference. Timestamps
//! are UTC via `chrono`.

mod project;
mod branch;
mod task;
mod subtask;
mod label;
mod context;
mod delegation;

pub use project::{Project, NewProject, UpdateProject};
pub use branch::{Branch, NewBranch, UpdateBranch};
pub use task::{
    Task, NewTask, UpdateTask, TaskFilter, TaskStatus, Priority, ProgressEntry,
};
pub use subtask::{Subtask, NewSubtask, UpdateSubtask};
pub use label::Label;
pub use context::{
    ContextLevel, GlobalContext, ProjectContext, BranchContext, TaskContext,
    ResolvedContext, InsightEntry, InsightCategory, InsightImportance,
};
pub use delegation::{DelegationRequest, DelegationStatus};

/// Opaque 128-bit identifier, rendered lowercase hex-with-hyphens on the wire.
pub type Id = uuid::Uuid;
