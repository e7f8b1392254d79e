use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::UserId;

/// A product user. Identity itself lives with the auth provider; this record
/// carries the email and the credit balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub credits: i32,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}
