use actix_web::dev::Transform;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::HttpMessage;
use actix_web::Error;
use actix_service::{forward_ready, Service};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;

use crate::auth::{decode_token, SessionUser};
use crate::error::AppError;

/// Resolves a `Bearer` session token to the user id it was issued for.
///
/// Requests without an `Authorization` header pass through anonymously;
/// a header that is present but unusable is rejected with 401.
pub struct SessionAuth {
    secret: Rc<String>,
}

impl SessionAuth {
    pub fn new(secret: String) -> Self {
        SessionAuth {
            secret: Rc::new(secret),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SessionAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = SessionAuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SessionAuthMiddleware {
            service: Rc::new(service),
            secret: self.secret.clone(),
        })
    }
}

pub struct SessionAuthMiddleware<S> {
    service: Rc<S>,
    secret: Rc<String>,
}

impl<S, B> Service<ServiceRequest> for SessionAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let secret = self.secret.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let token = match req.headers().get("Authorization") {
                Some(header) => bearer_token(header.to_str().ok())?,
                None => return service.call(req).await,
            };

            match decode_token(&token, &secret) {
                Ok(claims) => {
                    req.extensions_mut().insert(SessionUser(claims.sub));
                    service.call(req).await
                }
                Err(e) => {
                    log::debug!("Rejected session token: {}", e);
                    Err(AppError::unauthorized("Not authorized, invalid session").into())
                }
            }
        })
    }
}

fn bearer_token(header: Option<&str>) -> Result<String, AppError> {
    let header = header.ok_or_else(|| AppError::unauthorized("Invalid authorization header"))?;
    header
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| AppError::unauthorized("Invalid authorization scheme"))
}
