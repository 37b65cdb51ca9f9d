//! Store implementations.
//!
//! Only the in-memory reference implementation ships here; any backend
//! satisfying the `SessionStore`/`FlowStateStore` contracts in
//! `authgate_core` can replace it.

mod memory;

pub use memory::MemoryStore;
