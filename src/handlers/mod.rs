use actix_web::{error, web, HttpRequest};

use crate::error::AppError;

pub mod orders;
pub mod products;
pub mod users;

/// Registers every `/api` route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::validation(err.to_string()).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        AppError::validation(err.to_string()).into()
    }))
    .app_data(web::PathConfig::default().error_handler(path_error))
    .service(
        web::scope("/api")
            .configure(users::routes)
            .configure(products::routes)
            .configure(orders::routes),
    );
}

fn path_error(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::validation(err.to_string()).into()
}
