use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::UserId;

/// The signed-in user, as reported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Server-assigned user id.
    pub id: UserId,

    /// Login email.
    pub email: String,

    /// Optional display name.
    #[serde(default)]
    pub full_name: Option<String>,

    /// Whether the account is enabled.
    pub is_active: bool,

    /// Whether the email address has been verified.
    pub is_verified: bool,

    /// When the account was created.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,
}

impl Identity {
    /// The name to greet the user by: the full name when set, else the email.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }
}
