pub mod adapter;
pub mod manager;
pub mod memory;
pub mod postgres;

pub use adapter::{Collection, DataAdapter, Document, Outcome};
pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryAdapter;
pub use postgres::PostgresAdapter;
