use axum::http::StatusCode;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user not found")]
    NotFound,

    #[error("invalid credentials")]
    InvalidCredential,

    #[error("account must log in via Google")]
    MustUseFederatedLogin,

    #[error("email already registered")]
    DuplicateEmail,

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("password hashing failed: {0}")]
    HashComputationFailed(String),

    #[error("oauth handshake failed: {0}")]
    OAuth(String),

    #[error("session token error: {0}")]
    SessionToken(#[from] jsonwebtoken::errors::Error),
}

pub type Result<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// Login failures the caller may see; everything else is an internal fault.
    pub fn is_login_failure(&self) -> bool {
        matches!(
            self,
            AuthError::NotFound | AuthError::InvalidCredential | AuthError::MustUseFederatedLogin
        )
    }

    /// Message exposed to the client. NotFound and InvalidCredential share one
    /// message so responses cannot be used to probe for accounts.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::NotFound | AuthError::InvalidCredential => "Invalid credentials",
            AuthError::MustUseFederatedLogin => "Try logging in via Google",
            AuthError::DuplicateEmail => "Email already registered",
            AuthError::OAuth(_) => "Google login failed",
            AuthError::StoreUnavailable(_)
            | AuthError::HashComputationFailed(_)
            | AuthError::SessionToken(_) => "Internal Server Error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::NotFound
            | AuthError::InvalidCredential
            | AuthError::MustUseFederatedLogin
            | AuthError::OAuth(_) => StatusCode::UNAUTHORIZED,
            AuthError::DuplicateEmail => StatusCode::CONFLICT,
            AuthError::StoreUnavailable(_)
            | AuthError::HashComputationFailed(_)
            | AuthError::SessionToken(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for (StatusCode, String) {
    fn from(e: AuthError) -> Self {
        let status = e.status();
        if status.is_server_error() {
            error!(error = %e, "auth request failed");
        }
        (status, e.public_message().to_string())
    }
}
