//! Revenue reporting over calendar windows in the server's local time zone.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use mongodb::bson::{doc, Document};
use serde::Serialize;
use serde_json::{json, Value};

use crate::models::{timestamp, Customer, Order};

/// A span of order creation times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Whether an order created exactly at `end` belongs to the window.
    pub end_inclusive: bool,
}

impl Window {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && if self.end_inclusive { at <= self.end } else { at < self.end }
    }

    /// `createdAt` range filter for the orders collection.
    pub fn filter(&self) -> Document {
        let end_op = if self.end_inclusive { "$lte" } else { "$lt" };
        let mut range = doc! { "$gte": timestamp::format(&self.start) };
        range.insert(end_op, timestamp::format(&self.end));
        doc! { "createdAt": range }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Week,
    Month,
}

impl Period {
    fn revenue_key(self) -> &'static str {
        match self {
            Period::Week => "weeklyRevenue",
            Period::Month => "monthlyRevenue",
        }
    }

    /// From the period's first midnight up to (not including) `now`.
    pub fn window<Tz: TimeZone>(self, now: &DateTime<Tz>) -> Window {
        let today = now.date_naive();
        let first_day = match self {
            Period::Week => today - Duration::days(i64::from(today.weekday().num_days_from_sunday())),
            Period::Month => today.with_day(1).unwrap_or(today),
        };
        Window {
            start: local_midnight(&now.timezone(), first_day),
            end: now.with_timezone(&Utc),
            end_inclusive: false,
        }
    }
}

/// Start of `date` in `tz`. When midnight falls into a DST gap the first
/// instant after it is used.
fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let mut local = date.and_time(chrono::NaiveTime::MIN);
    for _ in 0..4 {
        if let Some(at) = tz.from_local_datetime(&local).earliest() {
            return at.with_timezone(&Utc);
        }
        local += Duration::minutes(30);
    }
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Whole-day windows from six days ago through today, each closed at 23:59:59.999.
pub fn last_seven_days<Tz: TimeZone>(now: &DateTime<Tz>) -> Vec<(NaiveDate, Window)> {
    let tz = now.timezone();
    let today = now.date_naive();
    (0..7)
        .rev()
        .map(|back| {
            let day = today - Duration::days(back);
            let start = local_midnight(&tz, day);
            let end = local_midnight(&tz, day + Duration::days(1)) - Duration::milliseconds(1);
            (day, Window { start, end, end_inclusive: true })
        })
        .collect()
}

/// The whole span covered by a set of consecutive day windows.
pub fn span(days: &[(NaiveDate, Window)]) -> Option<Window> {
    let first = days.first()?.1;
    let last = days.last()?.1;
    Some(Window {
        start: first.start,
        end: last.end,
        end_inclusive: true,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub revenue: f64,
    pub total_orders: usize,
    pub unique_customers: usize,
    pub average_order_value: f64,
}

pub fn summarize(orders: &[Order]) -> Summary {
    let revenue: f64 = orders.iter().map(|order| order.total_price).sum();
    let total_orders = orders.len();
    let unique_customers = orders
        .iter()
        .map(|order| order.user.as_str())
        .collect::<HashSet<_>>()
        .len();
    let average_order_value = if total_orders > 0 {
        round2(revenue / total_orders as f64)
    } else {
        0.0
    };

    Summary {
        revenue,
        total_orders,
        unique_customers,
        average_order_value,
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetail {
    pub customer: Option<Customer>,
    pub order_id: String,
    pub total_price: f64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Weekly or monthly report body.
pub fn period_report(period: Period, orders: &[Order], customers: &HashMap<String, Customer>) -> Value {
    let summary = summarize(orders);
    let details: Vec<CustomerDetail> = orders
        .iter()
        .map(|order| CustomerDetail {
            customer: customers.get(&order.user).cloned(),
            order_id: order.id.clone(),
            total_price: order.total_price,
            created_at: order.created_at,
        })
        .collect();

    let mut report = json!({
        "totalOrders": summary.total_orders,
        "uniqueCustomers": summary.unique_customers,
        "averageOrderValue": summary.average_order_value,
        "customerDetails": details,
    });
    report[period.revenue_key()] = json!(summary.revenue);
    report
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: f64,
}

/// Buckets `orders` into the given day windows.
pub fn daily_revenue(days: &[(NaiveDate, Window)], orders: &[Order]) -> Vec<DailyRevenue> {
    days.iter()
        .map(|(date, window)| DailyRevenue {
            date: *date,
            revenue: orders
                .iter()
                .filter(|order| window.contains(order.created_at))
                .map(|order| order.total_price)
                .sum(),
        })
        .collect()
}
