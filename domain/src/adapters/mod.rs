//! Adapters that live inside the domain crate for convenience.
//!
//! The in-memory repository backs unit tests and `STORAGE_PROVIDER=memory`.
//! The real database adapter lives in `sqlite-adapter`.

pub mod memory_repo;
