pub mod dialect;
pub mod error;
pub mod query;
pub mod sql;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use dialect::{dialect_for_url, Postgres, Sqlite, SqlDialect};
pub use error::{StoreError, StoreResult};
pub use sql::SqlStore;
pub use traits::ProcurementStore;

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryStore;
