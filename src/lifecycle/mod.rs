// Public API - what other modules can use
pub use cache::{RecordCache, Slot, SlotState};
pub use engine::{spawn_engine, EngineCommand};
pub use errors::EngineError;
pub use handle::StatsHandle;
pub use mutations::{apply_mutation, Mutation};

// Internal modules
mod cache;
mod engine;
mod errors;
mod handle;
mod mutations;
