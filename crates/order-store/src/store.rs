use async_trait::async_trait;
use common::{CustomerId, OrderId};

use crate::{OrderRecord, Result};

/// Load/save capability keyed by order id.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new record.
    ///
    /// Fails with `AlreadyExists` if the order id is taken. The check and the
    /// insert are atomic, so concurrent creates of one id admit exactly one.
    async fn create(&self, record: &OrderRecord) -> Result<()>;

    /// Replaces the record of an existing order.
    ///
    /// Fails with `NotFound` if the order was never created.
    async fn save(&self, record: &OrderRecord) -> Result<()>;

    /// Loads a record by order id.
    ///
    /// Returns None if the order is unknown.
    async fn load(&self, order_id: &OrderId) -> Result<Option<OrderRecord>>;

    /// Lists every record of a customer, oldest update first.
    async fn list_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<OrderRecord>>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for std::sync::Arc<T> {
    async fn create(&self, record: &OrderRecord) -> Result<()> {
        (**self).create(record).await
    }

    async fn save(&self, record: &OrderRecord) -> Result<()> {
        (**self).save(record).await
    }

    async fn load(&self, order_id: &OrderId) -> Result<Option<OrderRecord>> {
        (**self).load(order_id).await
    }

    async fn list_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<OrderRecord>> {
        (**self).list_for_customer(customer_id).await
    }
}
