use actix_web::{web, HttpResponse};
use chrono::{Local, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::Collection;
use serde_json::{json, Value};

use crate::auth::{AdminUser, CurrentUser};
use crate::db;
use crate::error::AppError;
use crate::models::{NewOrder, Order, PaymentResult, StatusUpdate, User};
use crate::revenue::{self, Period};

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/orders", web::post().to(create_order))
        .route("/orders", web::get().to(get_orders))
        .route("/orders/myorders", web::get().to(get_my_orders))
        .route("/orders/revenue/week", web::get().to(get_revenue_week))
        .route("/orders/revenue/month", web::get().to(get_revenue_month))
        .route("/orders/revenue/7days", web::get().to(get_revenue_7days))
        .route("/orders/customer/{customer_id}", web::get().to(get_customer_orders))
        .route("/orders/{id}", web::get().to(get_order_by_id))
        .route("/orders/{id}/pay", web::put().to(update_order_to_paid))
        .route("/orders/{id}/deliver", web::put().to(update_order_to_delivered))
        .route("/orders/{id}/status", web::put().to(update_order_status));
}

async fn load_order(orders: &Collection<Order>, id: &str) -> Result<Order, AppError> {
    db::find_by_id(orders, id)
        .await?
        .ok_or_else(|| AppError::not_found("Order not found"))
}

async fn find_orders(orders: &Collection<Order>, filter: Document) -> Result<Vec<Order>, AppError> {
    Ok(orders.find(filter, None).await?.try_collect().await?)
}

/// Serializes `order` with its `user` id replaced by `owner`.
fn with_owner(order: &Order, owner: Value) -> Result<Value, AppError> {
    let mut value = serde_json::to_value(order)?;
    value["user"] = owner;
    Ok(value)
}

async fn create_order(
    orders: web::Data<Collection<Order>>,
    CurrentUser(user): CurrentUser,
    input: web::Json<NewOrder>,
) -> Result<HttpResponse, AppError> {
    let order = Order::place(&user.id, input.into_inner(), Utc::now())?;
    orders.insert_one(&order, None).await?;

    log::info!("Order {} placed by {} for {:.2}", order.id, user.user_id, order.total_price);
    Ok(HttpResponse::Created().json(order))
}

async fn get_order_by_id(
    orders: web::Data<Collection<Order>>,
    users: web::Data<Collection<User>>,
    _caller: CurrentUser,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let order = load_order(&orders, &id).await?;
    let owner = match db::find_by_id(&users, &order.user).await? {
        Some(user) => json!({ "_id": user.id, "name": user.name, "email": user.email }),
        None => Value::Null,
    };
    Ok(HttpResponse::Ok().json(with_owner(&order, owner)?))
}

async fn update_order_to_paid(
    orders: web::Data<Collection<Order>>,
    _caller: CurrentUser,
    id: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let receipt = payment_receipt(&body)?;
    let mut order = load_order(&orders, &id).await?;
    order.mark_paid(receipt, Utc::now());
    db::save_versioned(&orders, &mut order).await?;
    Ok(HttpResponse::Ok().json(order))
}

/// Gateway receipt sent with a payment. A bodyless request pays without one.
fn payment_receipt(body: &[u8]) -> Result<PaymentResult, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PaymentResult::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::validation(e.to_string()))
}

async fn update_order_to_delivered(
    orders: web::Data<Collection<Order>>,
    _admin: AdminUser,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let mut order = load_order(&orders, &id).await?;
    order.mark_delivered(Utc::now());
    db::save_versioned(&orders, &mut order).await?;
    Ok(HttpResponse::Ok().json(order))
}

async fn update_order_status(
    orders: web::Data<Collection<Order>>,
    id: web::Path<String>,
    update: web::Json<StatusUpdate>,
) -> Result<HttpResponse, AppError> {
    let mut order = load_order(&orders, &id).await?;
    order.set_status(update.into_inner(), Utc::now())?;
    db::save_versioned(&orders, &mut order).await?;
    Ok(HttpResponse::Ok().json(order))
}

async fn get_my_orders(
    orders: web::Data<Collection<Order>>,
    CurrentUser(user): CurrentUser,
) -> Result<HttpResponse, AppError> {
    let mine = find_orders(&orders, doc! { "user": user.id.as_str() }).await?;
    Ok(HttpResponse::Ok().json(mine))
}

async fn get_orders(
    orders: web::Data<Collection<Order>>,
    users: web::Data<Collection<User>>,
    _admin: AdminUser,
) -> Result<HttpResponse, AppError> {
    let all = find_orders(&orders, doc! {}).await?;
    let customers = db::customers_for(&users, &all).await?;

    let body = all
        .iter()
        .map(|order| {
            let owner = customers
                .get(&order.user)
                .map(|c| json!({ "_id": c.id, "name": c.name }))
                .unwrap_or(Value::Null);
            with_owner(order, owner)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HttpResponse::Ok().json(body))
}

/// Orders of one customer; an unknown customer simply has none.
pub(crate) async fn orders_of(
    orders: &Collection<Order>,
    customer_id: &str,
) -> Result<Vec<Order>, AppError> {
    find_orders(orders, doc! { "user": customer_id }).await
}

async fn get_customer_orders(
    orders: web::Data<Collection<Order>>,
    _admin: AdminUser,
    customer_id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(orders_of(&orders, &customer_id).await?))
}

async fn period_revenue(
    period: Period,
    orders: &Collection<Order>,
    users: &Collection<User>,
) -> Result<HttpResponse, AppError> {
    let window = period.window(&Local::now());
    log::debug!("{:?} revenue window {} .. {}", period, window.start, window.end);

    let found = find_orders(orders, window.filter()).await?;
    let customers = db::customers_for(users, &found).await?;
    Ok(HttpResponse::Ok().json(revenue::period_report(period, &found, &customers)))
}

async fn get_revenue_week(
    orders: web::Data<Collection<Order>>,
    users: web::Data<Collection<User>>,
    _admin: AdminUser,
) -> Result<HttpResponse, AppError> {
    period_revenue(Period::Week, &orders, &users).await
}

async fn get_revenue_month(
    orders: web::Data<Collection<Order>>,
    users: web::Data<Collection<User>>,
    _admin: AdminUser,
) -> Result<HttpResponse, AppError> {
    period_revenue(Period::Month, &orders, &users).await
}

async fn get_revenue_7days(
    orders: web::Data<Collection<Order>>,
    _admin: AdminUser,
) -> Result<HttpResponse, AppError> {
    let days = revenue::last_seven_days(&Local::now());
    let found = match revenue::span(&days) {
        Some(span) => find_orders(&orders, span.filter()).await?,
        None => Vec::new(),
    };
    Ok(HttpResponse::Ok().json(revenue::daily_revenue(&days, &found)))
}
