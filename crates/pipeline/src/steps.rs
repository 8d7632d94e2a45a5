//! Step and dependency names used in logs, records and metrics.

/// Dependency name of the inventory service.
pub const DEPENDENCY_INVENTORY: &str = "inventory";

/// Dependency name of the payment service.
pub const DEPENDENCY_PAYMENT: &str = "payment";

/// Step name: reserve inventory for the order.
pub const STEP_RESERVE_INVENTORY: &str = "inventory.reserve";

/// Step name: authorize payment for the order.
pub const STEP_AUTHORIZE_PAYMENT: &str = "payment.authorize";

/// Step name: durably record the confirmed order.
pub const STEP_CONFIRM: &str = "order.confirm";

/// Compensation: release reserved inventory.
pub const COMPENSATE_RELEASE_INVENTORY: &str = "inventory.release";

/// Compensation: void a payment authorization.
pub const COMPENSATE_VOID_PAYMENT: &str = "payment.void";
