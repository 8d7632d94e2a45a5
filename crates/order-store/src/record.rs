use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId};

/// One persisted order document.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    /// Current status name, kept alongside the document for querying.
    pub status: String,
    pub document: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Creates a record stamped with the current time.
    pub fn new(
        order_id: OrderId,
        customer_id: CustomerId,
        status: impl Into<String>,
        document: serde_json::Value,
    ) -> Self {
        Self {
            order_id,
            customer_id,
            status: status.into(),
            document,
            updated_at: Utc::now(),
        }
    }
}
