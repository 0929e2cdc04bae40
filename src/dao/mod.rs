/// Database model definitions.
pub mod models;
/// Completed poll storage and retrieval operations.
pub mod poll_store;
/// Storage abstraction layer for database operations.
pub mod storage;
