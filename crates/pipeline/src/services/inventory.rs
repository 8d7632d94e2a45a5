//! Inventory service trait and in-memory implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::{ItemId, OrderId};
use resilience::RemoteError;
use serde::{Deserialize, Serialize};

use crate::intent::LineItem;

/// Stock held for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// The reservation ID assigned by the inventory service.
    pub reservation_id: String,
    pub items: Vec<LineItem>,
}

impl Reservation {
    /// Describes the reserved items, e.g. `SKU1,2;SKU2,1`.
    pub fn describe(&self) -> String {
        self.items
            .iter()
            .map(LineItem::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Trait for inventory operations.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Reserves stock for every item of an order.
    async fn reserve(&self, order_id: &OrderId, items: &[LineItem])
    -> Result<Reservation, RemoteError>;

    /// Releases a previously made reservation. Releasing twice is a no-op.
    async fn release(&self, reservation: &Reservation) -> Result<(), RemoteError>;
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    /// Items without an entry have unlimited stock.
    stock: HashMap<ItemId, u32>,
    reservations: HashMap<String, (OrderId, Vec<LineItem>)>,
    next_id: u32,
    scripted_reserve_failures: VecDeque<RemoteError>,
    fail_on_reserve: Option<RemoteError>,
    fail_on_release: Option<RemoteError>,
    latency: Duration,
    reserve_calls: u32,
    release_calls: u32,
}

/// In-memory inventory service for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    state: Arc<Mutex<InMemoryInventoryState>>,
}

impl InMemoryInventoryService {
    /// Creates a new in-memory inventory service with unlimited stock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the available stock for an item.
    pub fn set_stock(&self, item_id: impl Into<ItemId>, quantity: u32) {
        self.lock().stock.insert(item_id.into(), quantity);
    }

    /// Returns the available stock for an item, if it is tracked.
    pub fn stock(&self, item_id: &ItemId) -> Option<u32> {
        self.lock().stock.get(item_id).copied()
    }

    /// Makes every reserve call fail with `error` until cleared with `None`.
    pub fn set_fail_on_reserve(&self, error: Option<RemoteError>) {
        self.lock().fail_on_reserve = error;
    }

    /// Queues a failure for the next reserve call only.
    pub fn fail_next_reserve(&self, error: RemoteError) {
        self.lock().scripted_reserve_failures.push_back(error);
    }

    /// Makes every release call fail with `error` until cleared with `None`.
    pub fn set_fail_on_release(&self, error: Option<RemoteError>) {
        self.lock().fail_on_release = error;
    }

    /// Delays every call by `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Returns the number of active reservations.
    pub fn reservation_count(&self) -> usize {
        self.lock().reservations.len()
    }

    /// Returns true if the order holds a reservation.
    pub fn has_reservation_for(&self, order_id: &OrderId) -> bool {
        self.lock()
            .reservations
            .values()
            .any(|(id, _)| id == order_id)
    }

    /// Returns how many reserve calls reached the service.
    pub fn reserve_calls(&self) -> u32 {
        self.lock().reserve_calls
    }

    /// Returns how many release calls reached the service.
    pub fn release_calls(&self) -> u32 {
        self.lock().release_calls
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryInventoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn reserve(
        &self,
        order_id: &OrderId,
        items: &[LineItem],
    ) -> Result<Reservation, RemoteError> {
        self.lock().reserve_calls += 1;
        self.simulate_latency().await;

        let mut state = self.lock();
        if let Some(error) = state.scripted_reserve_failures.pop_front() {
            return Err(error);
        }
        if let Some(error) = &state.fail_on_reserve {
            return Err(error.clone());
        }

        for item in items {
            if let Some(available) = state.stock.get(&item.item_id)
                && *available < item.quantity
            {
                return Err(RemoteError::rejected(format!(
                    "insufficient stock for {}",
                    item.item_id
                )));
            }
        }
        for item in items {
            if let Some(available) = state.stock.get_mut(&item.item_id) {
                *available -= item.quantity;
            }
        }

        state.next_id += 1;
        let reservation_id = format!("RES-{:04}", state.next_id);
        state
            .reservations
            .insert(reservation_id.clone(), (order_id.clone(), items.to_vec()));

        Ok(Reservation {
            reservation_id,
            items: items.to_vec(),
        })
    }

    async fn release(&self, reservation: &Reservation) -> Result<(), RemoteError> {
        self.lock().release_calls += 1;
        self.simulate_latency().await;

        let mut state = self.lock();
        if let Some(error) = &state.fail_on_release {
            return Err(error.clone());
        }

        if let Some((_, items)) = state.reservations.remove(&reservation.reservation_id) {
            for item in items {
                if let Some(available) = state.stock.get_mut(&item.item_id) {
                    *available += item.quantity;
                }
            }
        }
        Ok(())
    }
}
