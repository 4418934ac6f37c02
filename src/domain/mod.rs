// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate has its own subdirectory with:
// - Value objects
// - Events
// - Commands
// - Errors
// - Aggregate implementation
//
// Nothing in here performs I/O. Persistence lives in `store`, orchestration
// in `service`.
//
// ============================================================================

pub mod aggregate;
pub mod cart;
pub mod order;

pub use aggregate::Aggregate;
