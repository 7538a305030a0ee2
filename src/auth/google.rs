//! Google OAuth 2.0 authorization-code flow with PKCE.
//!
//! [`GoogleOAuth::authorize_url`] persists the CSRF state and PKCE verifier in
//! `oauth_states` for ten minutes and drops rows past that window.
//! [`GoogleOAuth::exchange`] consumes that row in the same statement that
//! validates it, trades the code for an access token and reads the userinfo
//! endpoint into a [`FederatedProfile`].

use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::auth::error::{AuthError, Result};
use crate::auth::strategy::FederatedProfile;
use crate::config::GoogleConfig;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// Google userinfo (v3) response.
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    email: String,
    name: Option<String>,
    email_verified: Option<bool>,
}

type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

pub struct GoogleOAuth {
    client: ConfiguredClient,
    http: reqwest::Client,
    db: PgPool,
}

impl GoogleOAuth {
    pub fn new(cfg: &GoogleConfig, db: PgPool) -> anyhow::Result<Self> {
        let client = BasicClient::new(ClientId::new(cfg.client_id.clone()))
            .set_client_secret(ClientSecret::new(cfg.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(AUTH_URL.to_string())?)
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string())?)
            .set_redirect_uri(RedirectUrl::new(cfg.redirect_url.clone())?);

        // The token endpoint must not be allowed to bounce us elsewhere.
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client, http, db })
    }

    fn build_authorize_url(&self) -> (String, CsrfToken, PkceCodeVerifier) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, csrf) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();
        (url.to_string(), csrf, pkce_verifier)
    }

    /// Returns the provider URL to redirect the browser to. Abandoned handshakes
    /// are swept first, since this endpoint needs no login.
    #[instrument(skip(self))]
    pub async fn authorize_url(&self) -> Result<String> {
        let (url, csrf, verifier) = self.build_authorize_url();
        let purged = sqlx::query("DELETE FROM oauth_states WHERE expires_at <= NOW()")
            .execute(&self.db)
            .await?
            .rows_affected();
        if purged > 0 {
            debug!(purged, "expired oauth states removed");
        }
        sqlx::query(
            r#"
            INSERT INTO oauth_states (state, pkce_verifier, expires_at)
            VALUES ($1, $2, NOW() + INTERVAL '10 minutes')
            "#,
        )
        .bind(csrf.secret())
        .bind(verifier.secret())
        .execute(&self.db)
        .await?;
        Ok(url)
    }

    /// Completes the handshake started by [`authorize_url`](Self::authorize_url).
    #[instrument(skip(self, code, state))]
    pub async fn exchange(&self, code: &str, state: &str) -> Result<FederatedProfile> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            DELETE FROM oauth_states
            WHERE state = $1 AND expires_at > NOW()
            RETURNING pkce_verifier
            "#,
        )
        .bind(state)
        .fetch_optional(&self.db)
        .await?;
        let (verifier,) = row.ok_or_else(|| AuthError::OAuth("invalid or expired state".into()))?;

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(verifier))
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::OAuth(format!("token exchange: {e}")))?;

        let info: GoogleUserInfo = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(token.access_token().secret())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::OAuth(format!("userinfo: {e}")))?
            .json()
            .await
            .map_err(|e| AuthError::OAuth(format!("userinfo body: {e}")))?;

        let profile = profile_from_userinfo(info)?;
        debug!(email = %profile.email, "google profile fetched");
        Ok(profile)
    }
}

fn profile_from_userinfo(info: GoogleUserInfo) -> Result<FederatedProfile> {
    if info.email_verified == Some(false) {
        return Err(AuthError::OAuth("google email not verified".into()));
    }
    let display_name = info
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| {
            info.email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string()
        });
    Ok(FederatedProfile {
        email: info.email,
        display_name,
    })
}
