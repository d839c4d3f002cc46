//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM over SQLite. Pipelines talk to the
//! [`VideoStore`] trait; [`DieselVideoStore`] is the real implementation and
//! [`MemoryVideoStore`] backs tests.

pub mod context;
pub mod diesel_store;
pub mod error;
pub mod memory;
pub mod pool;
pub mod store;
pub mod util;

pub use context::DbContext;
pub use diesel_store::DieselVideoStore;
pub use error::StoreError;
pub use memory::MemoryVideoStore;
pub use pool::{DbError, DbPool};
pub use store::{StoreCounts, VideoStore};
