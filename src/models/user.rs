use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp;

/// Counter that mints the human-readable `userId`.
pub const USER_ID_SEQUENCE: &str = "userId";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    /// argon2 encoded hash, never the plain password
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// `User-0001` for customers, `AD-0001` for admins.
pub fn format_user_id(seq: i64, is_admin: bool) -> String {
    let prefix = if is_admin { "AD" } else { "User" };
    format!("{}-{:04}", prefix, seq)
}

/// What a user looks like over HTTP; the password hash stays behind.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub address: Option<Address>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        UserProfile {
            id: user.id.clone(),
            user_id: user.user_id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
            address: user.address.clone(),
            created_at: user.created_at,
        }
    }
}

/// Owner details attached to orders in reports and lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Customer {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub address: Option<Address>,
}

impl From<&User> for Customer {
    fn from(user: &User) -> Self {
        Customer {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            address: user.address.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub address: Option<Address>,
    /// Only honored when an admin makes the request.
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub address: Option<Address>,
}

/// Body of a successful login or registration.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user _id
    pub exp: usize,
}
