//! Storefront REST backend: accounts, catalog with reviews, orders, and
//! revenue reports on top of MongoDB.

use actix_web::web;
use mongodb::Database;

pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod revenue;

use crate::config::Config;
use crate::db::Sequences;
use crate::models::{Order, Product, User};

/// Shares the collections, sequences and config with every handler and
/// mounts the `/api` routes. Wrap the app in `middleware::SessionAuth` to
/// make sessions visible to the handlers.
pub fn configure(db: &Database, config: &Config) -> impl FnOnce(&mut web::ServiceConfig) {
    let users = db.collection::<User>(db::USERS);
    let products = db.collection::<Product>(db::PRODUCTS);
    let orders = db.collection::<Order>(db::ORDERS);
    let sequences = Sequences::new(db);
    let config = config.clone();

    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::Data::new(users))
            .app_data(web::Data::new(products))
            .app_data(web::Data::new(orders))
            .app_data(web::Data::new(sequences))
            .app_data(web::Data::new(config));
        handlers::configure(cfg);
    }
}
