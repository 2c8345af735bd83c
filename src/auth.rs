//! Session tokens, password hashing, and the extractors that gate handlers.

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpMessage, HttpRequest};
use argon2::Config as ArgonConfig;
use futures::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::Collection;
use rand::Rng;

use crate::db;
use crate::error::AppError;
use crate::models::{Claims, User};

/// User id recorded on the request by `SessionAuth`.
#[derive(Debug, Clone)]
pub struct SessionUser(pub String);

pub fn issue_token(user_id: &str, secret: &str, ttl_hours: i64) -> Result<String, AppError> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(ttl_hours))
        .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
        .map_err(|e| AppError::Internal(format!("Failed to encode token: {}", e)))
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt: [u8; 16] = rand::thread_rng().gen();
    let config = ArgonConfig::default();
    argon2::hash_encoded(password.as_bytes(), &salt, &config)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    argon2::verify_encoded(hash, password.as_bytes()).unwrap_or(false)
}

/// Hashing is CPU-bound; keep it off the async workers.
pub async fn hash_password_blocking(password: String) -> Result<String, AppError> {
    web::block(move || hash_password(&password)).await?
}

pub async fn verify_password_blocking(hash: String, password: String) -> Result<bool, AppError> {
    Ok(web::block(move || verify_password(&hash, &password)).await?)
}

/// The authenticated caller, loaded from the users collection.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// An authenticated caller with the admin flag set.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

/// The caller if a session is present, otherwise `None`.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

async fn load_session_user(
    session: Option<SessionUser>,
    users: Option<web::Data<Collection<User>>>,
) -> Result<Option<User>, AppError> {
    let Some(SessionUser(id)) = session else {
        return Ok(None);
    };
    let users = users.ok_or_else(|| AppError::Internal("Users collection not registered".to_string()))?;
    match db::find_by_id(users.get_ref(), &id).await? {
        Some(user) => Ok(Some(user)),
        None => Err(AppError::unauthorized("Not authorized, user not found")),
    }
}

fn session_parts(req: &HttpRequest) -> (Option<SessionUser>, Option<web::Data<Collection<User>>>) {
    (
        req.extensions().get::<SessionUser>().cloned(),
        req.app_data::<web::Data<Collection<User>>>().cloned(),
    )
}

impl FromRequest for MaybeUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let (session, users) = session_parts(req);
        Box::pin(async move { load_session_user(session, users).await.map(MaybeUser) })
    }
}

impl FromRequest for CurrentUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let (session, users) = session_parts(req);
        Box::pin(async move {
            load_session_user(session, users)
                .await?
                .map(CurrentUser)
                .ok_or_else(|| AppError::unauthorized("Not authorized, no session"))
        })
    }
}

impl FromRequest for AdminUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let current = CurrentUser::from_request(req, payload);
        Box::pin(async move {
            let CurrentUser(user) = current.await?;
            if user.is_admin {
                Ok(AdminUser(user))
            } else {
                log::warn!("Non-admin {} tried an admin route", user.user_id);
                Err(AppError::unauthorized("Not authorized as an admin"))
            }
        })
    }
}
