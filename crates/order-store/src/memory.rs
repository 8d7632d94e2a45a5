use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{CustomerId, OrderId};
use tokio::sync::RwLock;

use crate::{OrderRecord, OrderStore, Result, StoreError};

/// In-memory order store implementation.
///
/// Used by tests and by the API binary when no database is configured.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    records: Arc<RwLock<HashMap<OrderId, OrderRecord>>>,
    fail_on_save: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Makes every subsequent `save` fail until switched off again.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.fail_on_save.store(fail, Ordering::SeqCst);
    }

    /// Clears all records.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, record: &OrderRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.order_id) {
            return Err(StoreError::AlreadyExists(record.order_id.clone()));
        }
        records.insert(record.order_id.clone(), record.clone());
        Ok(())
    }

    async fn save(&self, record: &OrderRecord) -> Result<()> {
        if self.fail_on_save.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("save disabled".to_string()));
        }

        let mut records = self.records.write().await;
        match records.get_mut(&record.order_id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.order_id.clone())),
        }
    }

    async fn load(&self, order_id: &OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.records.read().await.get(order_id).cloned())
    }

    async fn list_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<OrderRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<_> = records
            .values()
            .filter(|r| &r.customer_id == customer_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        Ok(matching)
    }
}
