//! Catalog search: turns loose query-string parameters into a MongoDB
//! filter, sort, and page window.

use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const PAGE_SIZE: u64 = 8;

/// Highest page whose skip still fits the server's signed 64-bit counter.
pub const MAX_PAGE: u64 = i64::MAX as u64 / PAGE_SIZE;

/// Raw query string of `GET /api/products`. Everything is optional and untyped.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub page: Option<String>,
    pub category: Option<String>,
    pub price_range: Option<String>,
    pub sort_by: Option<String>,
    pub keyword: Option<String>,
    pub brand: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    PriceAsc,
    PriceDesc,
    Newest,
    NameAsc,
    NameDesc,
}

impl SortKey {
    /// Unknown keys fall back to natural order.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "price-asc" => Some(SortKey::PriceAsc),
            "price-desc" => Some(SortKey::PriceDesc),
            "newest" => Some(SortKey::Newest),
            "name-asc" => Some(SortKey::NameAsc),
            "name-desc" => Some(SortKey::NameDesc),
            _ => None,
        }
    }

    pub fn to_document(self) -> Document {
        match self {
            SortKey::PriceAsc => doc! { "price": 1 },
            SortKey::PriceDesc => doc! { "price": -1 },
            SortKey::Newest => doc! { "createdAt": -1 },
            SortKey::NameAsc => doc! { "name": 1 },
            SortKey::NameDesc => doc! { "name": -1 },
        }
    }
}

/// Filters echoed back to the client, empty strings for unset ones.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFilters {
    pub category: String,
    pub price_range: String,
    pub keyword: String,
    pub brand: String,
    pub sort_by: String,
}

#[derive(Debug)]
pub struct ProductQuery {
    pub filter: Document,
    pub sort: Option<Document>,
    pub page: u64,
    pub applied: AppliedFilters,
}

impl ProductQuery {
    pub fn build(params: SearchParams) -> Result<Self, AppError> {
        let page = params
            .page
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|page| *page >= 1)
            .map(|page| page.min(MAX_PAGE))
            .unwrap_or(1);

        let applied = AppliedFilters {
            category: params.category.unwrap_or_default(),
            price_range: params.price_range.unwrap_or_default(),
            keyword: params.keyword.unwrap_or_default(),
            brand: params.brand.unwrap_or_default(),
            sort_by: params.sort_by.unwrap_or_default(),
        };

        let mut filter = Document::new();
        if !applied.keyword.is_empty() {
            filter.insert(
                "name",
                doc! { "$regex": regex::escape(&applied.keyword), "$options": "i" },
            );
        }
        if !applied.category.is_empty() {
            filter.insert("category", applied.category.clone());
        }
        if !applied.brand.is_empty() {
            filter.insert("brand", applied.brand.clone());
        }
        if !applied.price_range.is_empty() {
            let (min, max) = parse_price_range(&applied.price_range)?;
            filter.insert("price", doc! { "$gte": min, "$lte": max });
        }

        Ok(ProductQuery {
            filter,
            sort: SortKey::parse(&applied.sort_by).map(SortKey::to_document),
            page,
            applied,
        })
    }

    pub fn skip(&self) -> u64 {
        PAGE_SIZE.saturating_mul(self.page.saturating_sub(1))
    }
}

/// `"10-50"` → `(10.0, 50.0)`. Both bounds must be finite numbers.
pub fn parse_price_range(raw: &str) -> Result<(f64, f64), AppError> {
    let invalid = || AppError::validation(format!("Invalid price range: {}", raw));
    let (min, max) = raw.split_once('-').ok_or_else(invalid)?;
    let min: f64 = min.trim().parse().map_err(|_| invalid())?;
    let max: f64 = max.trim().parse().map_err(|_| invalid())?;
    if !min.is_finite() || !max.is_finite() {
        return Err(invalid());
    }
    Ok((min, max))
}

pub fn page_count(total: u64) -> u64 {
    (total + PAGE_SIZE - 1) / PAGE_SIZE
}
