use actix_web::{web, HttpResponse};
use chrono::Utc;
use futures::stream::TryStreamExt;
use mongodb::bson::{self, doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::Collection;

use crate::auth::{self, AdminUser, CurrentUser, MaybeUser};
use crate::config::Config;
use crate::db::{self, Sequences};
use crate::error::AppError;
use crate::handlers::orders::orders_of;
use crate::models::user::{format_user_id, USER_ID_SEQUENCE};
use crate::models::{AuthResponse, LoginInput, Order, ProfileUpdate, RegisterInput, User, UserProfile};

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/users/login", web::post().to(login_user))
        .route("/users/register", web::post().to(register_user))
        .route("/users/profile", web::get().to(get_user_profile))
        .route("/users/profile", web::put().to(update_user_profile))
        .route("/users", web::get().to(get_users))
        .route("/users/{user_id}/orders", web::get().to(get_user_orders));
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, AppError> {
    let value = value.trim();
    if value.is_empty() {
        Err(AppError::validation(format!("{} is required", field)))
    } else {
        Ok(value)
    }
}

async fn email_taken(users: &Collection<User>, email: &str, except: Option<&str>) -> Result<bool, AppError> {
    let mut filter = doc! { "email": email };
    if let Some(id) = except {
        filter.insert("_id", doc! { "$ne": id });
    }
    Ok(users.find_one(filter, None).await?.is_some())
}

async fn register_user(
    users: web::Data<Collection<User>>,
    sequences: web::Data<Sequences>,
    config: web::Data<Config>,
    MaybeUser(caller): MaybeUser,
    input: web::Json<RegisterInput>,
) -> Result<HttpResponse, AppError> {
    let input = input.into_inner();
    let name = required(&input.name, "Name")?.to_string();
    let email = required(&input.email, "Email")?.to_lowercase();
    required(&input.password, "Password")?;

    if email_taken(&users, &email, None).await? {
        return Err(AppError::validation("User already exists"));
    }

    let is_admin = input.is_admin && caller.as_ref().map_or(false, |c| c.is_admin);
    let seq = sequences.next(USER_ID_SEQUENCE).await?;
    let password = auth::hash_password_blocking(input.password).await?;

    let now = Utc::now();
    let user = User {
        id: crate::models::new_id(),
        user_id: format_user_id(seq, is_admin),
        name,
        email,
        password,
        is_admin,
        address: input.address,
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = users.insert_one(&user, None).await {
        return Err(if db::is_duplicate_key(&e) {
            AppError::validation("User already exists")
        } else {
            e.into()
        });
    }

    log::info!("Registered {} ({})", user.user_id, user.email);
    let token = auth::issue_token(&user.id, &config.jwt_secret, config.token_ttl_hours)?;
    Ok(HttpResponse::Created().json(AuthResponse {
        profile: UserProfile::from(&user),
        token,
    }))
}

async fn login_user(
    users: web::Data<Collection<User>>,
    config: web::Data<Config>,
    input: web::Json<LoginInput>,
) -> Result<HttpResponse, AppError> {
    let input = input.into_inner();
    let email = input.email.trim().to_lowercase();
    let rejected = || AppError::unauthorized("Invalid email or password");

    let user = match users.find_one(doc! { "email": email.as_str() }, None).await? {
        Some(user) => user,
        None => {
            log::warn!("Login attempt for unknown email {}", email);
            return Err(rejected());
        }
    };
    if !auth::verify_password_blocking(user.password.clone(), input.password).await? {
        log::warn!("Wrong password for {}", user.user_id);
        return Err(rejected());
    }

    let token = auth::issue_token(&user.id, &config.jwt_secret, config.token_ttl_hours)?;
    Ok(HttpResponse::Ok().json(AuthResponse {
        profile: UserProfile::from(&user),
        token,
    }))
}

async fn get_user_profile(CurrentUser(user): CurrentUser) -> HttpResponse {
    HttpResponse::Ok().json(UserProfile::from(&user))
}

async fn update_user_profile(
    users: web::Data<Collection<User>>,
    CurrentUser(user): CurrentUser,
    update: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, AppError> {
    let update = update.into_inner();
    let mut changes = Document::new();

    if let Some(name) = update.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        changes.insert("name", name);
    }
    if let Some(email) = update.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        let email = email.to_lowercase();
        if email != user.email && email_taken(&users, &email, Some(&user.id)).await? {
            return Err(AppError::validation("Email already in use"));
        }
        changes.insert("email", email);
    }
    if let Some(password) = update.password.filter(|p| !p.is_empty()) {
        changes.insert("password", auth::hash_password_blocking(password).await?);
    }
    if let Some(address) = update.address {
        changes.insert("address", bson::to_bson(&address)?);
    }
    changes.insert("updatedAt", crate::models::timestamp::format(&Utc::now()));

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let updated = users
        .find_one_and_update(doc! { "_id": user.id.as_str() }, doc! { "$set": changes }, options)
        .await
        .map_err(|e| {
            if db::is_duplicate_key(&e) {
                AppError::validation("Email already in use")
            } else {
                e.into()
            }
        })?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(HttpResponse::Ok().json(UserProfile::from(&updated)))
}

async fn get_users(
    users: web::Data<Collection<User>>,
    _admin: AdminUser,
) -> Result<HttpResponse, AppError> {
    let all: Vec<User> = users.find(None, None).await?.try_collect().await?;
    let profiles: Vec<UserProfile> = all.iter().map(UserProfile::from).collect();
    Ok(HttpResponse::Ok().json(profiles))
}

async fn get_user_orders(
    orders: web::Data<Collection<Order>>,
    _admin: AdminUser,
    user_id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(orders_of(&orders, &user_id).await?))
}
