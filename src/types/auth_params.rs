use serde::{Deserialize, Serialize};

/// Body of a login request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginParams {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl LoginParams {
    /// Create login parameters.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for LoginParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginParams")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body of a registration request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParams {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
    /// Optional display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl RegisterParams {
    /// Create registration parameters.
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        full_name: Option<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            full_name,
        }
    }

    /// The login that follows a successful registration.
    pub fn login(&self) -> LoginParams {
        LoginParams::new(self.email.clone(), self.password.clone())
    }
}

impl std::fmt::Debug for RegisterParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterParams")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("full_name", &self.full_name)
            .finish()
    }
}

/// Body of a token refresh request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshParams {
    /// The refresh token to exchange.
    pub refresh_token: String,
}
