pub mod approval;
pub mod catalog;
pub mod instance;
pub mod store;
pub mod tracker;

pub use approval::{
    ApprovalEngine, DEFAULT_POLL_INTERVAL, MAX_APPROVAL_DELAY_SECS, MIN_APPROVAL_DELAY_SECS,
};
pub use catalog::{Difficulty, Question, QuestionKind, TaskCatalog, TaskDefinition};
pub use instance::{Answer, InstanceStatus, TaskInstance};
pub use store::{InstanceStore, MemoryInstanceStore};
pub use tracker::{StartOutcome, TaskTracker};
