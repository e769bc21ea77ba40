//! Knowledge records: model, persistence backends, and status transitions.

pub mod memory;
pub mod sqlite;
pub mod state_machine;
pub mod store;
pub mod types;

pub use memory::InMemoryKnowledgeStore;
pub use sqlite::SqliteKnowledgeStore;
pub use state_machine::{IllegalTransition, Outcome, Transition, transition};
pub use store::{CasOutcome, KnowledgeStore, StoreError};
pub use types::{
    ContentSource, ContentType, KnowledgeRecord, KnowledgeView, NewKnowledge, ProcessingStatus,
    StatusUpdate,
};
