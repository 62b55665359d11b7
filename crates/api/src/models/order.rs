//! Orders, order lines and the sales report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use appejv_core::{CustomerId, OrderId, OrderItemId, OrderStatus, ProductId, SubjectId};

/// Order header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    /// Subject id of the agent who placed the order.
    pub sale_id: SubjectId,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// One order line. `price_at_order` is the product price when the order was
/// placed; later price changes never touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price_at_order: Decimal,
}

/// An order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// `POST /orders` body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: CustomerId,
    pub items: Vec<OrderLineRequest>,
}

/// A requested line. `quantity` stays signed so non-positive values reach
/// validation instead of failing deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// `PUT /orders/{id}` body.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UpdateOrderRequest {
    pub status: OrderStatus,
}

/// Aggregates over live orders in a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesReport {
    pub total_orders: u64,
    pub total_revenue: Decimal,
    pub status_count: BTreeMap<OrderStatus, u64>,
}

impl SalesReport {
    /// Fold `orders` into totals and a per-status count.
    #[must_use]
    pub fn from_orders(orders: &[Order]) -> Self {
        let mut status_count = BTreeMap::new();
        let mut total_revenue = Decimal::ZERO;
        for order in orders {
            total_revenue += order.total_amount;
            *status_count.entry(order.status).or_insert(0) += 1;
        }
        Self {
            total_orders: orders.len() as u64,
            total_revenue,
            status_count,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn order(id: i64, status: OrderStatus, total: i64) -> Order {
        Order {
            id: OrderId::new(id),
            customer_id: CustomerId::new(1),
            sale_id: SubjectId::new("agent-1"),
            status,
            total_amount: Decimal::new(total, 2),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_sales_report_totals() {
        let report = SalesReport::from_orders(&[
            order(1, OrderStatus::Pending, 1000),
            order(2, OrderStatus::Delivered, 2550),
            order(3, OrderStatus::Pending, 450),
        ]);
        assert_eq!(report.total_orders, 3);
        assert_eq!(report.total_revenue, Decimal::new(4000, 2));
        assert_eq!(report.status_count[&OrderStatus::Pending], 2);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status_count"]["delivered"], 1);
    }

    #[test]
    fn test_details_flatten_header() {
        let details = OrderDetails {
            order: order(9, OrderStatus::Confirmed, 2000),
            items: Vec::new(),
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["id"], 9);
        assert_eq!(json["status"], "confirmed");
        assert_eq!(json["total_amount"], "20.00");
        assert!(json["items"].as_array().unwrap().is_empty());
    }
}
