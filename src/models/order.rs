use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{new_id, timestamp};
use crate::error::AppError;

pub const DEFAULT_STATUS: &str = "Pending";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: String,
    /// `_id` of the owning user
    pub user: String,
    #[serde(default)]
    pub order_items: Vec<OrderItem>,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub items_price: f64,
    #[serde(default)]
    pub shipping_price: f64,
    #[serde(default)]
    pub total_price: f64,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default, with = "timestamp::option")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_result: Option<PaymentResult>,
    #[serde(default)]
    pub is_delivered: bool,
    #[serde(default, with = "timestamp::option")]
    pub delivered_at: Option<DateTime<Utc>>,
    pub status: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub name: String,
    pub qty: u32,
    #[serde(default)]
    pub image: Option<String>,
    pub price: f64,
    /// `_id` of the ordered product
    pub product: String,
    #[serde(default)]
    pub size: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// Payment provider's receipt, kept as the provider sends it.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PaymentResult {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub update_time: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    /// `None` (absent or null) is accepted; `Some(vec![])` is not.
    #[serde(default)]
    pub order_items: Option<Vec<OrderItem>>,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub items_price: f64,
    #[serde(default)]
    pub shipping_price: f64,
    #[serde(default)]
    pub total_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: Option<String>,
}

impl Order {
    pub fn place(owner: &str, input: NewOrder, now: DateTime<Utc>) -> Result<Self, AppError> {
        if matches!(&input.order_items, Some(items) if items.is_empty()) {
            return Err(AppError::validation("No order items"));
        }
        for price in [input.items_price, input.shipping_price, input.total_price] {
            if !price.is_finite() || price < 0.0 {
                return Err(AppError::validation("Prices must be non-negative numbers"));
            }
        }

        Ok(Order {
            id: new_id(),
            user: owner.to_string(),
            order_items: input.order_items.unwrap_or_default(),
            shipping_address: input.shipping_address,
            payment_method: input.payment_method,
            items_price: input.items_price,
            shipping_price: input.shipping_price,
            total_price: input.total_price,
            is_paid: false,
            paid_at: None,
            payment_result: None,
            is_delivered: false,
            delivered_at: None,
            status: DEFAULT_STATUS.to_string(),
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Repeating the call refreshes the receipt but keeps the first `paid_at`.
    pub fn mark_paid(&mut self, receipt: PaymentResult, now: DateTime<Utc>) {
        self.is_paid = true;
        self.paid_at.get_or_insert(now);
        self.payment_result = Some(receipt);
        self.updated_at = now;
    }

    pub fn mark_delivered(&mut self, now: DateTime<Utc>) {
        self.is_delivered = true;
        self.delivered_at.get_or_insert(now);
        self.updated_at = now;
    }

    pub fn set_status(&mut self, update: StatusUpdate, now: DateTime<Utc>) -> Result<(), AppError> {
        let status = update
            .status
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::validation("Status is required"))?;
        self.status = status;
        self.updated_at = now;
        Ok(())
    }
}
