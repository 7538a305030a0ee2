//! Session tokens.
//!
//! A session is a server-side row plus a signed HS256 token whose subject is the
//! user id and whose `sid` names the row. Deleting the row (logout) invalidates
//! the token even though its signature and expiry are still good.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::auth::error::Result;
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{Principal, User};
use crate::config::SessionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,    // user id
    pub sid: Uuid,   // session row id
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

/// Upper bound on `SESSION_TTL_MINUTES` (one year).
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl SessionKeys {
    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs(cfg.ttl_minutes.clamp(1, MAX_TTL_MINUTES) as u64 * 60),
        }
    }

    fn expires_at(&self, now: OffsetDateTime) -> OffsetDateTime {
        now + TimeDuration::seconds(self.ttl.as_secs() as i64)
    }

    fn sign(&self, user_id: i64, sid: Uuid, now: OffsetDateTime) -> Result<String> {
        let exp = self.expires_at(now);
        let claims = Claims {
            sub: user_id,
            sid,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id, %sid, "session token signed");
        Ok(token)
    }

    fn verify(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

/// Server-side record of live sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, id: Uuid, user_id: i64, expires_at: OffsetDateTime) -> Result<()>;
    /// Owner of an unexpired session, if any.
    async fn lookup(&self, id: Uuid) -> Result<Option<i64>>;
    async fn revoke(&self, id: Uuid) -> Result<()>;
    /// Drops every expired session, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

#[derive(Clone)]
pub struct PgSessionStore {
    db: PgPool,
}

impl PgSessionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, id: Uuid, user_id: i64, expires_at: OffsetDateTime) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn lookup(&self, id: Uuid) -> Result<Option<i64>> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT user_id
            FROM sessions
            WHERE id = $1 AND expires_at > NOW()
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(|(user_id,)| user_id))
    }

    async fn revoke(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let res = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected())
    }
}

pub struct SessionManager {
    keys: SessionKeys,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(
        keys: SessionKeys,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            keys,
            users,
            sessions,
        }
    }

    /// Opens a session for `user` and returns its token. Expired sessions are
    /// swept before the new row is written.
    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn serialize(&self, user: &User) -> Result<String> {
        let sid = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let token = self.keys.sign(user.id, sid, now)?;

        let purged = self.sessions.purge_expired().await?;
        if purged > 0 {
            debug!(purged, "expired sessions removed");
        }
        self.sessions
            .create(sid, user.id, self.keys.expires_at(now))
            .await?;
        Ok(token)
    }

    /// Resolves a token to its principal. `Ok(None)` means the caller is anonymous.
    #[instrument(skip_all)]
    pub async fn deserialize(&self, token: &str) -> Result<Option<Principal>> {
        let claims = match self.keys.verify(token) {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "session token rejected");
                return Ok(None);
            }
        };

        match self.sessions.lookup(claims.sid).await? {
            Some(owner) if owner == claims.sub => {}
            Some(owner) => {
                warn!(sid = %claims.sid, owner, sub = claims.sub, "session owner mismatch");
                return Ok(None);
            }
            None => {
                debug!(sid = %claims.sid, "session revoked or expired");
                return Ok(None);
            }
        }

        let Some(user) = self.users.find_by_id(claims.sub).await? else {
            debug!(user_id = claims.sub, "session user no longer exists");
            return Ok(None);
        };
        Ok(Some(user.principal()))
    }

    /// Ends the session behind `token`. Unknown or invalid tokens are a no-op.
    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str) -> Result<()> {
        if let Ok(claims) = self.keys.verify(token) {
            self.sessions.revoke(claims.sid).await?;
            debug!(user_id = claims.sub, sid = %claims.sid, "session revoked");
        }
        Ok(())
    }
}
