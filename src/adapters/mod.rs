pub mod memory;
pub mod postgres;

pub use memory::InMemoryTransactionStore;
pub use postgres::PostgresTransactionStore;
