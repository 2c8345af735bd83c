use std::io;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer};

use shop_api::config::Config;
use shop_api::db;
use shop_api::middleware::SessionAuth;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let db = db::connect(&config).await.map_err(io::Error::other)?;
    db::ensure_indexes(&db).await.map_err(io::Error::other)?;
    log::info!("Connected to database {}", config.database_name);

    let bind_address = config.bind_address.clone();
    log::info!("Listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(SessionAuth::new(config.jwt_secret.clone()))
            .wrap(Logger::default())
            .configure(shop_api::configure(&db, &config))
    })
    .bind(bind_address)?
    .run()
    .await
}
