//! Configuration value model.
//!
//! # Data Flow
//! ```text
//! source document (serde_json::Value)
//!     → arena.rs (Tree: live nodes with stable NodeId identity)
//!     → path.rs (identity → path search, path → identity resolution, cache)
//!     → node.rs (owned Node copies handed to callers)
//! ```
//!
//! # Design Decisions
//! - Two representations: the arena for identity, the owned enum for values
//! - Identity equality, never value equality, keys the registry and cache

pub mod arena;
pub mod node;
pub mod path;

pub use arena::{Content, NodeId, Tree};
pub use node::{Key, Node, NodeType};
pub use path::PathCache;
