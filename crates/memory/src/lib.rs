//! Store implementations for crabdesk.
//!
//! Two stores live here: the read-write session store (conversation memory)
//! and an in-memory knowledge store used by tests and the CLI demo.
//! Production deployments plug an external vector database behind the same
//! `KnowledgeStore` trait.

pub mod in_memory;
pub mod knowledge;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemorySessionStore;
pub use knowledge::InMemoryKnowledgeStore;
pub use vector::cosine_similarity;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSessionStore;
