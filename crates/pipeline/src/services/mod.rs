//! Downstream dependency traits and in-memory implementations.
//!
//! Services report failures as [`resilience::RemoteError`] so the resilience
//! layer can tell business rejections from transient unavailability.

pub mod inventory;
pub mod payment;

pub use inventory::{InMemoryInventoryService, InventoryService, Reservation};
pub use payment::{Authorization, InMemoryPaymentService, PaymentService};
