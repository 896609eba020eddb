//! The authenticated identity and the credential behind it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::api::ChatApi;
use crate::credentials::CredentialStore;
use crate::error::AppError;
use crate::observability::{AUTH_FAILURES, AUTH_LOGINS};
use crate::types::{Identity, LoginParams, RegisterParams};

/// What the registration form collects.
#[derive(Clone, PartialEq, Eq)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub full_name: Option<String>,
}

impl RegisterForm {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        confirm_password: impl Into<String>,
        full_name: Option<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            confirm_password: confirm_password.into(),
            full_name,
        }
    }

    /// Check the form without touching the network.
    pub fn validate(&self) -> Result<RegisterParams, AppError> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(AppError::validation("Email is required"));
        }
        if self.password.is_empty() {
            return Err(AppError::validation("Password is required"));
        }
        if self.password != self.confirm_password {
            return Err(AppError::validation("Passwords do not match"));
        }
        let full_name = self
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from);
        Ok(RegisterParams::new(email, self.password.clone(), full_name))
    }
}

impl std::fmt::Debug for RegisterForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterForm")
            .field("email", &self.email)
            .field("full_name", &self.full_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct AuthState {
    identity: Option<Identity>,
    ready: bool,
    last_error: Option<AppError>,
    /// Bumped by every login and logout.  An identity fetch that started
    /// under an older generation does not get to set the identity.
    generation: u64,
}

/// Holds who is signed in.
///
/// The identity is derived from the persisted credential: it is only set
/// after the API has accepted that credential, and any failure to confirm it
/// clears both.
pub struct AuthStore<A: ChatApi + ?Sized> {
    api: Arc<A>,
    credentials: Arc<dyn CredentialStore>,
    state: Mutex<AuthState>,
}

impl<A: ChatApi + ?Sized> AuthStore<A> {
    pub fn new(api: Arc<A>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            api,
            credentials,
            state: Mutex::new(AuthState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attempt one identity refresh, then mark the store ready.
    pub async fn initialize(&self) {
        self.refresh_identity().await;
        self.state().ready = true;
    }

    /// Whether [`AuthStore::initialize`] has finished.  Until then the
    /// identity says nothing about whether a credential is stored.
    pub fn is_ready(&self) -> bool {
        self.state().ready
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state().identity.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().identity.is_some()
    }

    /// Changes whenever the signed-in account may have changed.
    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    pub fn last_error(&self) -> Option<AppError> {
        self.state().last_error.clone()
    }

    pub fn dismiss_error(&self) {
        self.state().last_error = None;
    }

    /// Sign in and load the identity.
    ///
    /// A rejected login leaves the prior credential and identity untouched.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AppError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(self.fail(AppError::validation("Email and password are required")));
        }
        let credential = match self.api.login(LoginParams::new(email, password)).await {
            Ok(credential) => credential,
            Err(err) => {
                tracing::warn!(email, error = %err, "login rejected");
                return Err(self.fail(AppError::auth(err)));
            }
        };
        if let Err(err) = self.credentials.save(&credential) {
            tracing::warn!(error = %err, "could not persist credential");
            return Err(self.fail(AppError::auth(err)));
        }
        let generation = {
            let mut state = self.state();
            state.generation += 1;
            state.last_error = None;
            state.generation
        };
        match self.fetch_identity(generation).await {
            Some(identity) => {
                AUTH_LOGINS.click();
                tracing::info!(user_id = identity.id, "signed in");
                Ok(identity)
            }
            None => Err(self.fail(AppError::auth_message(
                "Signed in, but the account could not be loaded",
            ))),
        }
    }

    /// Create an account, then sign in with it.
    pub async fn register(&self, form: &RegisterForm) -> Result<Identity, AppError> {
        let params = form.validate().map_err(|err| self.fail(err))?;
        if let Err(err) = self.api.register(params.clone()).await {
            tracing::warn!(email = %params.email, error = %err, "registration rejected");
            return Err(self.fail(AppError::auth(err)));
        }
        tracing::info!(email = %params.email, "registered");
        self.login(&params.email, &params.password).await
    }

    /// Forget the credential and identity.  Safe to call when signed out.
    pub fn logout(&self) {
        if let Err(err) = self.credentials.clear() {
            tracing::warn!(error = %err, "could not remove stored credential");
        }
        let mut state = self.state();
        if state.identity.take().is_some() {
            tracing::info!("signed out");
        }
        state.generation += 1;
        state.last_error = None;
    }

    /// Re-derive the identity from the stored credential.
    ///
    /// Any failure clears the credential and the identity.
    pub async fn refresh_identity(&self) -> Option<Identity> {
        let generation = self.generation();
        self.fetch_identity(generation).await
    }

    async fn fetch_identity(&self, generation: u64) -> Option<Identity> {
        match self.credentials.load() {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.state().identity = None;
                return None;
            }
            Err(err) => {
                tracing::warn!(error = %err, "stored credential is unreadable");
                self.clear_if_current(generation);
                return None;
            }
        }
        match self.api.current_user().await {
            Ok(identity) => {
                let mut state = self.state();
                if state.generation != generation {
                    tracing::debug!("identity refresh overtaken by login or logout");
                    return None;
                }
                state.identity = Some(identity.clone());
                Some(identity)
            }
            Err(err) => {
                tracing::warn!(error = %err, "identity refresh failed");
                self.clear_if_current(generation);
                None
            }
        }
    }

    fn clear_if_current(&self, generation: u64) {
        let mut state = self.state();
        if state.generation != generation {
            return;
        }
        if let Err(err) = self.credentials.clear() {
            tracing::warn!(error = %err, "could not remove stored credential");
        }
        state.identity = None;
        state.generation += 1;
    }

    fn fail(&self, err: AppError) -> AppError {
        AUTH_FAILURES.click();
        self.state().last_error = Some(err.clone());
        err
    }
}
