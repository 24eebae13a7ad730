use log::{error, info, warn};
use std::sync::Arc;

use crate::client::models::session::SessionStore;
use crate::client::services::api_client::{ApiError, Credentials, DatingApi, PasswordChange, Registration};
use crate::client::utils::validation::{self, ValidationError};
use crate::common::models::User;

pub const EMAIL_NOT_VERIFIED: &str = "Email not verified. Please verify your email before logging in.";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The account exists but its email was never confirmed.
    #[error("{}", EMAIL_NOT_VERIFIED)]
    EmailNotVerified { email: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            AuthError::Api(e) => e.user_message(fallback),
            other => other.to_string(),
        }
    }
}

/// Where the user goes after signing in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginDestination {
    Onboarding,
    Dashboard,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Account flows. Every mutation of the session goes through [`SessionStore`].
#[derive(Clone)]
pub struct AuthService {
    api: Arc<dyn DatingApi>,
    session: SessionStore,
}

impl AuthService {
    pub fn new(api: Arc<dyn DatingApi>, session: SessionStore) -> Self {
        Self { api, session }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginDestination, AuthError> {
        validation::require("Email", email)?;
        validation::require("Password", password)?;

        let credentials = Credentials { email: email.trim().to_string(), password: password.to_string() };
        let auth = match self.api.login(&credentials).await {
            Ok(auth) => auth,
            Err(ApiError::Status { message: Some(ref m), email: Some(ref unverified), .. }) if m == EMAIL_NOT_VERIFIED => {
                info!("[AUTH] Login blocked until {} is verified", unverified);
                return Err(AuthError::EmailNotVerified { email: unverified.clone() });
            }
            Err(e) => {
                error!("[AUTH] Login failed: {}", e);
                return Err(e.into());
            }
        };
        self.session.login_with(auth.token, auth.user);

        match self.api.onboarding_status().await {
            Ok(status) if !status.onboarding_completed => Ok(LoginDestination::Onboarding),
            Ok(_) => Ok(LoginDestination::Dashboard),
            Err(e) => {
                warn!("[AUTH] Failed to check onboarding status: {}", e);
                Ok(LoginDestination::Dashboard)
            }
        }
    }

    /// Creates the account and returns the address that must be verified.
    pub async fn register(&self, form: &RegisterForm) -> Result<String, AuthError> {
        validation::require("Username", &form.username)?;
        validation::require("Email", &form.email)?;
        validation::confirm_matches(&form.password, &form.confirm_password)?;

        let registration = Registration {
            username: form.username.trim().to_string(),
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            email: form.email.trim().to_string(),
            password: form.password.clone(),
        };
        let resp = self.api.register(&registration).await.map_err(|e| {
            error!("[AUTH] Registration failed: {}", e);
            e
        })?;
        info!("[AUTH] Registered user {}", resp.user.id);
        Ok(resp.user.email.unwrap_or(registration.email))
    }

    /// Confirms the emailed token; the server answers with a fresh session.
    pub async fn verify_email(&self, token: &str) -> Result<User, AuthError> {
        validation::require("Verification token", token)?;
        let auth = self.api.verify_email(token).await?;
        let user = auth.user.clone();
        self.session.login_with(auth.token, auth.user);
        Ok(user)
    }

    pub async fn resend_verification(&self, email: &str) -> Result<Option<String>, AuthError> {
        validation::require("Email", email)?;
        Ok(self.api.resend_verification(email.trim()).await?.message)
    }

    pub async fn forgot_password(&self, email: &str) -> Result<Option<String>, AuthError> {
        validation::require("Email", email)?;
        Ok(self.api.forgot_password(email.trim()).await?.message)
    }

    pub async fn reset_password(&self, token: &str, password: &str, confirm: &str) -> Result<(), AuthError> {
        validation::check_reset_password(token, password, confirm)?;
        self.api.reset_password(token, password).await?;
        info!("[AUTH] Password reset completed");
        Ok(())
    }

    pub async fn change_password(&self, current: &str, new_password: &str, confirm: &str) -> Result<(), AuthError> {
        validation::require("Current password", current)?;
        validation::check_new_password(new_password, confirm)?;
        let change = PasswordChange {
            current_password: current.to_string(),
            new_password: new_password.to_string(),
            confirm_password: confirm.to_string(),
        };
        self.api.update_password(&change).await?;
        info!("[AUTH] Password updated");
        Ok(())
    }

    /// Permanently deletes the account after the user typed `DELETE`, then signs out.
    pub async fn delete_account(&self, typed_confirmation: &str) -> Result<(), AuthError> {
        validation::confirm_deletion(typed_confirmation)?;
        self.api.delete_account().await?;
        self.session.logout();
        Ok(())
    }

    pub fn logout(&self) {
        self.session.logout();
    }
}
