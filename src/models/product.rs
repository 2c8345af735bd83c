use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

use super::{new_id, timestamp, User};
use crate::error::AppError;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub num_reviews: i64,
    #[serde(default)]
    pub rating: f64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub name: String,
    pub rating: f64,
    pub comment: String,
    /// `_id` of the reviewing user
    pub user: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(input: NewProduct, now: DateTime<Utc>) -> Result<Self, AppError> {
        if input.name.trim().is_empty() {
            return Err(AppError::validation("Product name is required"));
        }
        check_price(input.price)?;

        Ok(Product {
            id: new_id(),
            name: input.name,
            price: input.price,
            image: input.image,
            brand: input.brand,
            category: input.category,
            description: input.description,
            sizes: input.sizes,
            reviews: Vec::new(),
            num_reviews: 0,
            rating: 0.0,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Overwrites only the fields present in `update`.
    pub fn apply(&mut self, update: ProductUpdate, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(price) = update.price {
            check_price(price)?;
            self.price = price;
        }
        if let Some(name) = update.name.filter(|name| !name.trim().is_empty()) {
            self.name = name;
        }
        if update.image.is_some() {
            self.image = update.image;
        }
        if update.brand.is_some() {
            self.brand = update.brand;
        }
        if update.category.is_some() {
            self.category = update.category;
        }
        if update.description.is_some() {
            self.description = update.description;
        }
        if let Some(sizes) = update.sizes {
            self.sizes = sizes;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn has_review_from(&self, user_id: &str) -> bool {
        self.reviews.iter().any(|review| review.user == user_id)
    }

    /// Appends `reviewer`'s review and refreshes `num_reviews` and `rating`.
    /// One review per user; a second attempt leaves the product untouched.
    pub fn add_review(
        &mut self,
        reviewer: &User,
        input: ReviewInput,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if !(1.0..=5.0).contains(&input.rating) {
            return Err(AppError::validation("Rating must be between 1 and 5"));
        }
        if self.has_review_from(&reviewer.id) {
            return Err(AppError::validation("Product already reviewed"));
        }

        self.reviews.push(Review {
            name: reviewer.name.clone(),
            rating: input.rating,
            comment: input.comment,
            user: reviewer.id.clone(),
            created_at: now,
        });
        self.refresh_rating();
        self.updated_at = now;
        Ok(())
    }

    fn refresh_rating(&mut self) {
        self.num_reviews = self.reviews.len() as i64;
        self.rating = if self.reviews.is_empty() {
            0.0
        } else {
            self.reviews.iter().map(|review| review.rating).sum::<f64>() / self.reviews.len() as f64
        };
    }
}

fn check_price(price: f64) -> Result<(), AppError> {
    if price.is_finite() && price >= 0.0 {
        Ok(())
    } else {
        Err(AppError::validation("Price must be a non-negative number"))
    }
}

#[derive(Debug, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub image: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub sizes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewInput {
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub rating: f64,
    #[serde(default)]
    pub comment: String,
}

/// Form clients send numbers as strings: accepts `4` and `"4"` alike.
fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("rating must be a number, got {:?}", text))),
    }
}
