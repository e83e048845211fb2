//! Persistence Adapters
//!
//! Order ledger implementations of `OrderRepository`.

pub mod in_memory;
pub mod turso_repository;

pub use in_memory::InMemoryOrderRepository;
pub use turso_repository::TursoOrderRepository;
