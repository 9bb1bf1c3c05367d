//! Infrastructure adapters for external systems.

pub mod embeddings;
pub mod evidence;
pub mod oracles;
pub mod sqlite;
