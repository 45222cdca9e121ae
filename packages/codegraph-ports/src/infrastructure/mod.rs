//! Infrastructure layer - in-process port adapters
//!
//! - `MemoryGraph`: node/relationship store with statement-keyed query handlers
//! - `ScriptedCompletion`: completion service answering from prompt rules

pub mod memory;
pub mod scripted;

pub use memory::{GraphSnapshot, MemoryGraph, QueryCall, StoredNode, StoredRelationship};
pub use scripted::{CompletionCall, ScriptedCompletion};
