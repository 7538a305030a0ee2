use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, GoogleCallback, LoginMethods, LoginRequest, PublicUser, RegisterRequest},
        error::AuthError,
        extractors::{AuthUser, BearerToken},
        repo_types::{Principal, User},
        strategy::{authenticate_federated, authenticate_local, register_local},
    },
    state::AppState,
};

pub const LOGIN_PATH: &str = "/api/v1/auth/login";
const GOOGLE_PATH: &str = "/api/v1/auth/google";
const MIN_PASSWORD_LEN: usize = 8;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", get(login_methods).post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/google", get(google_start))
        .route("/auth/google/callback", get(google_callback))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn validate_registration(payload: &RegisterRequest) -> Result<(), (StatusCode, String)> {
    if payload.username.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Username is required".into()));
    }
    if !is_valid_email(&payload.email) {
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }
    Ok(())
}

async fn open_session(state: &AppState, user: User) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let token = state.sessions.serialize(&user).await?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Response, (StatusCode, String)> {
    payload.username = payload.username.trim().to_string();
    payload.email = payload.email.trim().to_string();

    if let Err(rejection) = validate_registration(&payload) {
        warn!(reason = %rejection.1, "registration rejected");
        return Err(rejection);
    }

    let user = match register_local(
        state.users.as_ref(),
        &state.hasher,
        &payload.username,
        &payload.email,
        &payload.password,
    )
    .await
    {
        Ok(u) => u,
        Err(AuthError::DuplicateEmail) => {
            info!("email already registered; sending caller to login");
            return Ok(Redirect::to(LOGIN_PATH).into_response());
        }
        Err(e) => return Err(e.into()),
    };

    Ok(open_session(&state, user).await?.into_response())
}

pub async fn login_methods(State(state): State<AppState>) -> Json<LoginMethods> {
    Json(LoginMethods {
        local: LOGIN_PATH,
        google: state.google.as_ref().map(|_| GOOGLE_PATH),
    })
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.identifier = payload.identifier.trim().to_string();

    let user = authenticate_local(
        state.users.as_ref(),
        &state.hasher,
        &payload.identifier,
        &payload.password,
    )
    .await
    .map_err(|e| {
        if e.is_login_failure() {
            warn!(reason = %e, "login failed");
        }
        <(StatusCode, String)>::from(e)
    })?;

    open_session(&state, user).await
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<StatusCode, (StatusCode, String)> {
    state.sessions.logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn google_start(State(state): State<AppState>) -> Result<Redirect, (StatusCode, String)> {
    let google = state
        .google
        .as_ref()
        .ok_or((StatusCode::NOT_FOUND, "Google login is not enabled".to_string()))?;
    let url = google.authorize_url().await?;
    Ok(Redirect::to(&url))
}

#[instrument(skip(state, params))]
pub async fn google_callback(
    State(state): State<AppState>,
    Query(params): Query<GoogleCallback>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let google = state
        .google
        .as_ref()
        .ok_or((StatusCode::NOT_FOUND, "Google login is not enabled".to_string()))?;

    let profile = google.exchange(&params.code, &params.state).await.map_err(|e| {
        error!(error = %e, "google handshake failed");
        <(StatusCode, String)>::from(e)
    })?;
    let user = authenticate_federated(state.users.as_ref(), &profile).await?;

    open_session(&state, user).await
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(principal): AuthUser) -> Json<Principal> {
    Json(principal)
}
