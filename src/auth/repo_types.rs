use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Stored in `password_hash` for accounts created through Google login.
/// Never a valid PHC string, so no password can verify against it.
pub const FEDERATED_SENTINEL: &str = "google";

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC string or FEDERATED_SENTINEL
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn is_federated(&self) -> bool {
        self.password_hash == FEDERATED_SENTINEL
    }

    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

/// Identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
}
