//! Order intents accepted at the pipeline entry.

use common::{CustomerId, ItemId, Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// One ordered item and its quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_id: ItemId,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(item_id: impl Into<ItemId>, quantity: u32) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

impl std::fmt::Display for LineItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.item_id, self.quantity)
    }
}

/// A request to place an order. Never mutated once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<LineItem>,
    /// Requested total amount.
    pub amount: Money,
}

impl OrderIntent {
    /// Creates an intent without items.
    pub fn new(
        order_id: impl Into<OrderId>,
        customer_id: impl Into<CustomerId>,
        amount: Money,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            customer_id: customer_id.into(),
            items: Vec::new(),
            amount,
        }
    }

    /// Adds a line item.
    pub fn with_item(mut self, item_id: impl Into<ItemId>, quantity: u32) -> Self {
        self.items.push(LineItem::new(item_id, quantity));
        self
    }

    /// Checks that the intent is well-formed.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.order_id.is_blank() {
            return Err(PipelineError::InvalidIntent("order id is empty".into()));
        }
        if self.customer_id.is_blank() {
            return Err(PipelineError::InvalidIntent("customer id is empty".into()));
        }
        if self.items.is_empty() {
            return Err(PipelineError::InvalidIntent("order has no items".into()));
        }
        for item in &self.items {
            if item.item_id.is_blank() {
                return Err(PipelineError::InvalidIntent("item id is empty".into()));
            }
            if item.quantity == 0 {
                return Err(PipelineError::InvalidIntent(format!(
                    "quantity for {} must be positive",
                    item.item_id
                )));
            }
        }
        if !self.amount.is_positive() {
            return Err(PipelineError::InvalidIntent(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }

    /// Returns the total number of units ordered.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }
}
