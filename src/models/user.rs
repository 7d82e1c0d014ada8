use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const SUPPORTED_LANGUAGES: [&str; 2] = ["uk", "en"];

pub const DEFAULT_TIMEZONE: &str = "Europe/Kiev";
pub const DEFAULT_LANGUAGE: &str = "uk";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub telegram_id: i64,
    pub username: String,
    pub first_name: String,
    pub photo_url: Option<String>,
    pub timezone: String,
    pub language: String,
    pub created_at: String,
}

/// Identity handed over by the host platform on first app open. Registration
/// has upsert semantics: an existing row is returned unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUserRequest {
    pub telegram_id: i64,
    pub username: String,
    pub first_name: String,
    pub photo_url: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLanguageRequest {
    pub language: String,
}
