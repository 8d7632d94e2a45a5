//! Shared types for the order pipeline workspace.

pub mod types;

pub use types::{CustomerId, ItemId, Money, OrderId};
