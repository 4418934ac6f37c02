// ============================================================================
// Store - persistence for orders, cart snapshots and user contact data
// ============================================================================

pub mod memory;
pub mod postgres;
pub mod repository;

pub use memory::{Fault, MemoryStore};
pub use postgres::PgStore;
pub use repository::{
    CartSource, OrderRepository, OrderTransaction, StoreError, StoreResult, UserDirectory,
};
