use std::fmt;

use serde::{Deserialize, Serialize};

/// The bearer token pair issued on login.
///
/// Tokens are opaque to the client.  `Debug` never prints them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Short-lived token sent with every authenticated request.
    pub access_token: String,

    /// Long-lived token exchanged for a new pair when the access token expires.
    pub refresh_token: String,

    /// Token scheme; the server always issues "bearer".
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Credential {
    /// Create a bearer credential.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            token_type: default_token_type(),
        }
    }

    /// The value of the `Authorization` header for this credential.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn credential_from_token_response() {
        let json = json!({
            "access_token": "aaa",
            "refresh_token": "rrr",
            "token_type": "bearer"
        });
        let credential: Credential = serde_json::from_value(json).unwrap();
        assert_eq!(credential, Credential::new("aaa", "rrr"));
        assert_eq!(credential.authorization(), "Bearer aaa");
    }

    #[test]
    fn debug_redacts_tokens() {
        let rendered = format!("{:?}", Credential::new("secret-access", "secret-refresh"));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("bearer"));
    }
}
