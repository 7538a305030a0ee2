use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use tracing::warn;

use super::repo_types::Principal;
use super::session::SessionManager;

/// Raw session token from `Authorization: Bearer <token>`.
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".to_string(),
            ))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization header".to_string(),
            ))?;

        Ok(BearerToken(token.trim().to_string()))
    }
}

/// Principal of the current session; rejects anonymous callers with 401.
pub struct AuthUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<SessionManager>: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let sessions = Arc::<SessionManager>::from_ref(state);

        match sessions.deserialize(&token).await {
            Ok(Some(principal)) => Ok(AuthUser(principal)),
            Ok(None) => {
                warn!("invalid or expired session");
                Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired session".to_string(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo::UserStore;
    use crate::state::AppState;
    use axum::http::Request;

    fn parts(auth: Option<&str>) -> Parts {
        let mut req = Request::builder().uri("/me");
        if let Some(v) = auth {
            req = req.header(axum::http::header::AUTHORIZATION, v);
        }
        req.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let state = AppState::fake();
        let err = AuthUser::from_request_parts(&mut parts(None), &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_scheme_is_unauthorized() {
        let state = AppState::fake();
        let err = BearerToken::from_request_parts(&mut parts(Some("Basic abc")), &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.1, "Invalid Authorization header");
    }

    #[tokio::test]
    async fn live_session_resolves_principal() {
        let state = AppState::fake();
        let user = state.users.insert("alice", "a@x.com", "hash").await.unwrap();
        let token = state.sessions.serialize(&user).await.unwrap();

        let header = format!("Bearer {token}");
        let AuthUser(principal) = AuthUser::from_request_parts(&mut parts(Some(&header)), &state)
            .await
            .ok()
            .unwrap();
        assert_eq!(principal.id, user.id);
        assert_eq!(principal.username, "alice");
    }

    #[tokio::test]
    async fn logged_out_session_is_rejected() {
        let state = AppState::fake();
        let user = state.users.insert("alice", "a@x.com", "hash").await.unwrap();
        let token = state.sessions.serialize(&user).await.unwrap();
        state.sessions.logout(&token).await.unwrap();

        let header = format!("Bearer {token}");
        let err = AuthUser::from_request_parts(&mut parts(Some(&header)), &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }
}
