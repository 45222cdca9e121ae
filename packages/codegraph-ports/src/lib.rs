//! Collaborator ports for the codegraph analysis engines
//!
//! Two external services sit behind these traits:
//!
//! 1. **Graph store**: a code property graph (files, functions, classes,
//!    methods and their relationships) answering parameterized queries and
//!    accepting additive node/relationship writes.
//! 2. **Completion service**: a single-shot, stateless text-generation call.
//!
//! Engines depend only on the traits. Connections are owned by whoever builds
//! the adapter and shared by passing an `Arc<dyn GraphPort>` around.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use codegraph_ports::{GraphPort, params};
//!
//! let rows = graph
//!     .run_query("MATCH (n:Function) RETURN id(n) AS id", params([]))
//!     .await?;
//! let id = graph.create_node(&["Source"], props).await?;
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{PortError, PortErrorKind, Result};

pub use domain::{params, CompletionPort, GraphPort, NodeId, Params, Record, RecordExt};
pub use infrastructure::{MemoryGraph, ScriptedCompletion};
