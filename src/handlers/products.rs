use actix_web::{web, HttpResponse};
use chrono::Utc;
use futures::stream::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::FindOptions;
use mongodb::Collection;
use serde_json::json;

use crate::auth::{AdminUser, CurrentUser};
use crate::catalog::{self, ProductQuery, SearchParams, PAGE_SIZE};
use crate::db;
use crate::error::AppError;
use crate::models::{NewProduct, Product, ProductUpdate, ReviewInput};

const FEATURED_COUNT: i64 = 4;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/products", web::get().to(get_products))
        .route("/products", web::post().to(create_product))
        .route("/products/featured", web::get().to(get_featured_products))
        .route("/products/get-all", web::get().to(get_all_products))
        .route("/products/{id}", web::get().to(get_product_by_id))
        .route("/products/{id}", web::put().to(update_product))
        .route("/products/{id}", web::delete().to(delete_product))
        .route("/products/{id}/reviews", web::post().to(create_product_review));
}

async fn load_product(products: &Collection<Product>, id: &str) -> Result<Product, AppError> {
    db::find_by_id(products, id)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))
}

async fn get_products(
    products: web::Data<Collection<Product>>,
    params: web::Query<SearchParams>,
) -> Result<HttpResponse, AppError> {
    let query = ProductQuery::build(params.into_inner())?;

    let total = products.count_documents(query.filter.clone(), None).await?;
    let options = FindOptions::builder()
        .sort(query.sort.clone())
        .skip(query.skip())
        .limit(PAGE_SIZE as i64)
        .build();
    let page: Vec<Product> = products
        .find(query.filter.clone(), options)
        .await?
        .try_collect()
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "products": page,
        "page": query.page,
        "pages": catalog::page_count(total),
        "total": total,
        "filters": query.applied,
    })))
}

async fn get_featured_products(
    products: web::Data<Collection<Product>>,
) -> Result<HttpResponse, AppError> {
    let options = FindOptions::builder()
        .sort(doc! { "rating": -1, "numReviews": -1 })
        .limit(FEATURED_COUNT)
        .build();
    let featured: Vec<Product> = products.find(None, options).await?.try_collect().await?;
    Ok(HttpResponse::Ok().json(featured))
}

async fn get_all_products(products: web::Data<Collection<Product>>) -> Result<HttpResponse, AppError> {
    let all: Vec<Product> = products.find(None, None).await?.try_collect().await?;
    Ok(HttpResponse::Ok().json(all))
}

async fn get_product_by_id(
    products: web::Data<Collection<Product>>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(load_product(&products, &id).await?))
}

async fn create_product(
    products: web::Data<Collection<Product>>,
    AdminUser(admin): AdminUser,
    input: web::Json<NewProduct>,
) -> Result<HttpResponse, AppError> {
    let product = Product::new(input.into_inner(), Utc::now())?;
    products.insert_one(&product, None).await?;

    log::info!("Product {} created by {}", product.id, admin.user_id);
    Ok(HttpResponse::Created().json(product))
}

async fn update_product(
    products: web::Data<Collection<Product>>,
    _admin: AdminUser,
    id: web::Path<String>,
    update: web::Json<ProductUpdate>,
) -> Result<HttpResponse, AppError> {
    let mut product = load_product(&products, &id).await?;
    product.apply(update.into_inner(), Utc::now())?;
    db::save_versioned(&products, &mut product).await?;
    Ok(HttpResponse::Ok().json(product))
}

async fn delete_product(
    products: web::Data<Collection<Product>>,
    AdminUser(admin): AdminUser,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let result = products.delete_one(doc! { "_id": id.as_str() }, None).await?;
    if result.deleted_count == 0 {
        return Err(AppError::not_found("Product not found"));
    }

    log::info!("Product {} removed by {}", id, admin.user_id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Product removed" })))
}

/// The review and the refreshed rating land in one versioned replace, so a
/// failed save leaves the stored product exactly as it was.
async fn create_product_review(
    products: web::Data<Collection<Product>>,
    CurrentUser(user): CurrentUser,
    id: web::Path<String>,
    input: web::Json<ReviewInput>,
) -> Result<HttpResponse, AppError> {
    let mut product = load_product(&products, &id).await?;
    product.add_review(&user, input.into_inner(), Utc::now())?;
    db::save_versioned(&products, &mut product).await?;
    Ok(HttpResponse::Created().json(json!({ "message": "Review added" })))
}
