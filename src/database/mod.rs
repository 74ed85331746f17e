pub mod operations;
pub mod schema;
pub mod store;


pub use operations::Database;
pub use schema::{initialize_schema, run_migrations};
pub use store::TransactionStore;
