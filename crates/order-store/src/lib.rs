//! Persistence capability for order pipeline state.
//!
//! The pipeline only needs to load and save one document per order id. Stores
//! treat that document as opaque JSON so they stay independent of pipeline
//! types.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use record::OrderRecord;
pub use store::OrderStore;
