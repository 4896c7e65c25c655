//! Database module

pub mod operations;
pub mod schema;
pub mod store;

// Re-export for convenience
pub use operations::{DatabaseManager, NewRequest};
pub use schema::initialize_database;
pub use store::RequestStore;
