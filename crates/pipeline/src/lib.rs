//! Resilient order pipeline.
//!
//! An order intent moves through three steps:
//! 1. Reserve inventory
//! 2. Authorize payment
//! 3. Confirm (durably record the order as confirmed)
//!
//! Each downstream call runs through that dependency's
//! [`resilience::ResiliencePolicy`]. If any step fails, previously completed
//! steps are compensated in reverse order and the order ends `Failed`.

pub mod config;
pub mod error;
pub mod intent;
pub mod order;
pub mod outcome;
pub mod pipeline;
pub mod services;
pub mod status;
pub mod steps;

pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError, Result};
pub use intent::{LineItem, OrderIntent};
pub use order::{CompensationRecord, FailureRecord, OrderState, Transition};
pub use outcome::OrderOutcome;
pub use pipeline::{DependencyCircuit, OrderPipeline, Policies};
pub use services::{
    Authorization, InMemoryInventoryService, InMemoryPaymentService, InventoryService,
    PaymentService, Reservation,
};
pub use status::OrderStatus;
