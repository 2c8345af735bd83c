//! End-to-end tests against a real MongoDB.
//!
//! Run with `TEST_DATABASE_URL=mongodb://localhost:27017 cargo test -- --ignored`.
//! Each test works in its own throwaway database.

use actix_web::http::StatusCode;
use actix_web::{test, App};
use chrono::Utc;
use mongodb::Database;
use serde_json::{json, Value};

use shop_api::auth::hash_password;
use shop_api::config::Config;
use shop_api::db;
use shop_api::middleware::SessionAuth;
use shop_api::models::{NewOrder, NewProduct, Order, Product, User};

async fn setup() -> (Database, Config) {
    let config = Config {
        database_url: std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set"),
        database_name: format!("shop_test_{}", uuid::Uuid::new_v4().simple()),
        jwt_secret: "test-secret".to_string(),
        token_ttl_hours: 1,
        bind_address: "127.0.0.1:0".to_string(),
    };
    let db = db::connect(&config).await.expect("connect");
    db::ensure_indexes(&db).await.expect("indexes");
    (db, config)
}

macro_rules! app {
    ($db:expr, $config:expr) => {
        test::init_service(
            App::new()
                .wrap(SessionAuth::new($config.jwt_secret.clone()))
                .configure(shop_api::configure(&$db, &$config)),
        )
        .await
    };
}

async fn insert_admin(db: &Database, email: &str, password: &str) {
    let now = Utc::now();
    let admin = User {
        id: shop_api::models::new_id(),
        user_id: "AD-9999".to_string(),
        name: "Admin".to_string(),
        email: email.to_string(),
        password: hash_password(password).unwrap(),
        is_admin: true,
        address: None,
        created_at: now,
        updated_at: now,
    };
    db.collection::<User>(db::USERS).insert_one(&admin, None).await.unwrap();
}

fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

#[actix_web::test]
#[ignore = "needs TEST_DATABASE_URL pointing at MongoDB"]
async fn registration_mints_sequential_user_ids() {
    let (db, config) = setup().await;
    let app = app!(db, config);

    let mut ids = Vec::new();
    for (name, email) in [("Lan", "lan@example.com"), ("Minh", "minh@example.com")] {
        let req = test::TestRequest::post()
            .uri("/api/users/register")
            .set_json(json!({ "name": name, "email": email, "password": "s3cret-pass", "isAdmin": true }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(res).await;
        assert!(body.get("password").is_none());
        assert_eq!(body["isAdmin"], false);
        ids.push(body["userId"].as_str().unwrap().to_string());
    }
    assert_eq!(ids, vec!["User-0001", "User-0002"]);

    let req = test::TestRequest::post()
        .uri("/api/users/register")
        .set_json(json!({ "name": "Dup", "email": "lan@example.com", "password": "x" }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/users/login")
        .set_json(json!({ "email": "lan@example.com", "password": "wrong" }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    db.drop(None).await.unwrap();
}

#[actix_web::test]
#[ignore = "needs TEST_DATABASE_URL pointing at MongoDB"]
async fn order_lifecycle() {
    let (db, config) = setup().await;
    let app = app!(db, config);

    let req = test::TestRequest::post()
        .uri("/api/users/register")
        .set_json(json!({ "name": "Lan", "email": "lan@example.com", "password": "s3cret-pass" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let token = body["token"].as_str().unwrap().to_string();
    let user_id = body["_id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/orders")
        .insert_header(bearer(&token))
        .set_json(json!({ "orderItems": [], "totalPrice": 10 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/orders")
        .set_json(json!({ "orderItems": [{ "name": "Cap", "qty": 1, "price": 12.5, "product": "p1" }], "totalPrice": 12.5 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/orders")
        .insert_header(bearer(&token))
        .set_json(json!({
            "orderItems": [{ "name": "Cap", "qty": 1, "price": 12.5, "product": "p1" }],
            "paymentMethod": "PayPal",
            "itemsPrice": 12.5,
            "shippingPrice": 0,
            "totalPrice": 12.5
        }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(res).await;
    let order_id = created["_id"].as_str().unwrap().to_string();
    assert_eq!(created["user"], user_id.as_str());

    let req = test::TestRequest::get()
        .uri(&format!("/api/orders/{}", order_id))
        .insert_header(bearer(&token))
        .to_request();
    let fetched: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(fetched["user"]["name"], "Lan");
    assert_eq!(fetched["isPaid"], false);

    // Only admins deliver.
    let req = test::TestRequest::put()
        .uri(&format!("/api/orders/{}/deliver", order_id))
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    insert_admin(&db, "admin@example.com", "admin-pass").await;
    let req = test::TestRequest::post()
        .uri("/api/users/login")
        .set_json(json!({ "email": "admin@example.com", "password": "admin-pass" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let admin_token = body["token"].as_str().unwrap().to_string();

    // Delivered before paid is allowed.
    let req = test::TestRequest::put()
        .uri(&format!("/api/orders/{}/deliver", order_id))
        .insert_header(bearer(&admin_token))
        .to_request();
    let delivered: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(delivered["isDelivered"], true);
    assert_eq!(delivered["isPaid"], false);

    let req = test::TestRequest::put()
        .uri("/api/orders/does-not-exist/pay")
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::put()
        .uri(&format!("/api/orders/{}/pay", order_id))
        .insert_header(bearer(&token))
        .to_request();
    let paid: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(paid["isPaid"], true);
    let first_paid_at = paid["paidAt"].clone();
    assert!(first_paid_at.is_string());

    let req = test::TestRequest::put()
        .uri(&format!("/api/orders/{}/pay", order_id))
        .insert_header(bearer(&token))
        .set_json(json!({ "id": "PAY-1", "status": "COMPLETED" }))
        .to_request();
    let paid: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(paid["isPaid"], true);
    assert_eq!(paid["paymentResult"]["status"], "COMPLETED");
    assert_eq!(paid["paidAt"], first_paid_at);

    let req = test::TestRequest::put()
        .uri(&format!("/api/orders/{}/status", order_id))
        .set_json(json!({}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::put()
        .uri(&format!("/api/orders/{}/status", order_id))
        .set_json(json!({ "status": "Shipping" }))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["status"], "Shipping");

    let req = test::TestRequest::get()
        .uri("/api/orders/customer/nobody")
        .insert_header(bearer(&admin_token))
        .to_request();
    let none: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(none, json!([]));

    let req = test::TestRequest::get()
        .uri("/api/orders/does-not-exist")
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    db.drop(None).await.unwrap();
}

#[actix_web::test]
#[ignore = "needs TEST_DATABASE_URL pointing at MongoDB"]
async fn reviews_update_rating_once_per_user() {
    let (db, config) = setup().await;
    let app = app!(db, config);

    let product = Product::new(
        NewProduct {
            name: "Linen shirt".into(),
            price: 30.0,
            image: None,
            brand: None,
            category: None,
            description: None,
            sizes: Vec::new(),
        },
        Utc::now(),
    )
    .unwrap();
    let products = db.collection::<Product>(db::PRODUCTS);
    products.insert_one(&product, None).await.unwrap();

    let mut tokens = Vec::new();
    for i in 0..3 {
        let req = test::TestRequest::post()
            .uri("/api/users/register")
            .set_json(json!({ "name": format!("R{}", i), "email": format!("r{}@example.com", i), "password": "pw" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        tokens.push(body["token"].as_str().unwrap().to_string());
    }

    for (token, rating) in tokens.iter().zip([5, 4, 3]) {
        let req = test::TestRequest::post()
            .uri(&format!("/api/products/{}/reviews", product.id))
            .insert_header(bearer(token))
            .set_json(json!({ "rating": rating, "comment": "nice" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);
    }

    let req = test::TestRequest::post()
        .uri(&format!("/api/products/{}/reviews", product.id))
        .insert_header(bearer(&tokens[0]))
        .set_json(json!({ "rating": 1, "comment": "changed my mind" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let stored = db::find_by_id(&products, &product.id).await.unwrap().unwrap();
    assert_eq!(stored.num_reviews, 3);
    assert_eq!(stored.reviews.len(), 3);
    assert!((stored.rating - 4.0).abs() < 1e-9);

    db.drop(None).await.unwrap();
}

#[actix_web::test]
#[ignore = "needs TEST_DATABASE_URL pointing at MongoDB"]
async fn catalog_filters_and_pages() {
    let (db, config) = setup().await;
    let app = app!(db, config);

    let products = db.collection::<Product>(db::PRODUCTS);
    for i in 0..11 {
        let brand = if i % 2 == 0 { "Vans" } else { "Bata" };
        let product = Product::new(
            NewProduct {
                name: format!("Sneaker {:02}", i),
                price: 10.0 + i as f64,
                image: None,
                brand: Some(brand.into()),
                category: Some("shoes".into()),
                description: None,
                sizes: Vec::new(),
            },
            Utc::now(),
        )
        .unwrap();
        products.insert_one(&product, None).await.unwrap();
    }

    let req = test::TestRequest::get()
        .uri("/api/products?category=shoes&page=2&sortBy=price-asc")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["total"], 11);
    assert_eq!(body["pages"], 2);
    assert_eq!(body["page"], 2);
    assert_eq!(body["products"].as_array().unwrap().len(), 3);
    assert_eq!(body["products"][0]["price"], 18.0);

    let req = test::TestRequest::get()
        .uri("/api/products?category=shoes&brand=Vans&keyword=SNEAKER")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["total"], 6);
    for p in body["products"].as_array().unwrap() {
        assert_eq!(p["brand"], "Vans");
        assert_eq!(p["category"], "shoes");
    }
    assert_eq!(body["filters"]["brand"], "Vans");

    let req = test::TestRequest::get()
        .uri("/api/products?priceRange=cheap-20")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    db.drop(None).await.unwrap();
}

#[actix_web::test]
#[ignore = "needs TEST_DATABASE_URL pointing at MongoDB"]
async fn weekly_revenue_counts_this_weeks_orders() {
    let (db, config) = setup().await;
    let app = app!(db, config);

    insert_admin(&db, "admin@example.com", "admin-pass").await;
    let req = test::TestRequest::post()
        .uri("/api/users/login")
        .set_json(json!({ "email": "admin@example.com", "password": "admin-pass" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let admin_token = body["token"].as_str().unwrap().to_string();

    let orders = db.collection::<Order>(db::ORDERS);
    let now = Utc::now() - chrono::Duration::seconds(1);
    for (user, total) in [("a", 10.0), ("b", 20.0), ("a", 30.0)] {
        let input = NewOrder {
            order_items: None,
            shipping_address: None,
            payment_method: None,
            items_price: total,
            shipping_price: 0.0,
            total_price: total,
        };
        orders.insert_one(Order::place(user, input, now).unwrap(), None).await.unwrap();
    }
    let stale = NewOrder {
        order_items: None,
        shipping_address: None,
        payment_method: None,
        items_price: 99.0,
        shipping_price: 0.0,
        total_price: 99.0,
    };
    let old = Order::place("c", stale, now - chrono::Duration::days(40)).unwrap();
    orders.insert_one(old, None).await.unwrap();

    let req = test::TestRequest::get()
        .uri("/api/orders/revenue/week")
        .insert_header(bearer(&admin_token))
        .to_request();
    let report: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report["weeklyRevenue"], 60.0);
    assert_eq!(report["totalOrders"], 3);
    assert_eq!(report["uniqueCustomers"], 2);
    assert_eq!(report["averageOrderValue"], 20.0);

    let req = test::TestRequest::get()
        .uri("/api/orders/revenue/7days")
        .insert_header(bearer(&admin_token))
        .to_request();
    let days: Value = test::call_and_read_body_json(&app, req).await;
    let days = days.as_array().unwrap();
    assert_eq!(days.len(), 7);
    let total: f64 = days.iter().map(|d| d["revenue"].as_f64().unwrap()).sum();
    assert_eq!(total, 60.0);

    db.drop(None).await.unwrap();
}
