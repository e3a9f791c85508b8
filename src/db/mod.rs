pub mod connection;
pub mod memory_store;
pub mod schema;
pub mod store;
pub mod surreal_store;

pub use connection::{connect_db, DatabaseConnection, DbConfig};
pub use memory_store::InMemoryGraphStore;
pub use store::{GraphStore, StoreError};
pub use surreal_store::SurrealGraphStore;
