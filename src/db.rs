use std::collections::HashMap;

use futures::stream::TryStreamExt;
use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{Counter, Customer, Order, Product, User};

pub const USERS: &str = "users";
pub const PRODUCTS: &str = "products";
pub const ORDERS: &str = "orders";
pub const COUNTERS: &str = "counters";

pub async fn connect(config: &Config) -> mongodb::error::Result<Database> {
    let client_options = ClientOptions::parse(&config.database_url).await?;
    let client = Client::with_options(client_options)?;
    Ok(client.database(&config.database_name))
}

pub async fn ensure_indexes(db: &Database) -> mongodb::error::Result<()> {
    let unique_email = IndexModel::builder()
        .keys(doc! { "email": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    db.collection::<User>(USERS).create_index(unique_email, None).await?;

    let orders = db.collection::<Order>(ORDERS);
    orders
        .create_index(IndexModel::builder().keys(doc! { "user": 1 }).build(), None)
        .await?;
    orders
        .create_index(IndexModel::builder().keys(doc! { "createdAt": 1 }).build(), None)
        .await?;
    Ok(())
}

/// Atomic per-name integer sequences backed by the `counters` collection.
#[derive(Clone)]
pub struct Sequences {
    counters: Collection<Counter>,
}

impl Sequences {
    pub fn new(db: &Database) -> Self {
        Sequences {
            counters: db.collection(COUNTERS),
        }
    }

    /// Increments `name` and returns the new value; the first call yields 1.
    pub async fn next(&self, name: &str) -> mongodb::error::Result<i64> {
        let filter = doc! { "_id": name };
        let update = doc! { "$inc": { "seq": 1_i64 } };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        match self.counters.find_one_and_update(filter, update, options).await? {
            Some(counter) => Ok(counter.seq),
            None => Err(mongodb::error::Error::custom(format!(
                "Failed to generate sequence value for {}",
                name
            ))),
        }
    }
}

/// Documents saved with an optimistic version check.
pub trait Versioned {
    fn id(&self) -> &str;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
}

impl Versioned for Order {
    fn id(&self) -> &str {
        &self.id
    }
    fn version(&self) -> i64 {
        self.version
    }
    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

impl Versioned for Product {
    fn id(&self) -> &str {
        &self.id
    }
    fn version(&self) -> i64 {
        self.version
    }
    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

/// Replaces the stored document only if nobody saved it since it was read.
/// On success `record` carries the new version.
pub async fn save_versioned<T>(collection: &Collection<T>, record: &mut T) -> Result<(), AppError>
where
    T: Versioned + Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    let read_version = record.version();
    let filter = doc! { "_id": record.id(), "version": read_version };
    record.set_version(read_version + 1);

    let result = collection.replace_one(filter, &*record, None).await;
    match result {
        Ok(outcome) if outcome.matched_count == 1 => Ok(()),
        Ok(_) => {
            record.set_version(read_version);
            log::warn!(
                "Version conflict saving {} {} at version {}",
                collection.name(),
                record.id(),
                read_version
            );
            Err(AppError::Conflict(
                "The document was modified concurrently, please retry".to_string(),
            ))
        }
        Err(e) => {
            record.set_version(read_version);
            Err(e.into())
        }
    }
}

/// True for a unique-index violation (server error code 11000).
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref write)) => write.code == 11000,
        ErrorKind::Command(ref command) => command.code == 11000,
        _ => false,
    }
}

pub async fn find_by_id<T>(collection: &Collection<T>, id: &str) -> Result<Option<T>, AppError>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    Ok(collection.find_one(doc! { "_id": id }, None).await?)
}

/// Loads the owners behind a set of orders, keyed by user `_id`.
pub async fn customers_for(
    users: &Collection<User>,
    orders: &[Order],
) -> Result<HashMap<String, Customer>, AppError> {
    let mut ids: Vec<&str> = orders.iter().map(|order| order.user.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let found: Vec<User> = users
        .find(doc! { "_id": { "$in": ids } }, None)
        .await?
        .try_collect()
        .await?;
    Ok(found
        .iter()
        .map(|user| (user.id.clone(), Customer::from(user)))
        .collect())
}
