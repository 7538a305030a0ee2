use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::auth::error::{AuthError, Result};
use crate::auth::password::Hasher;
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{User, FEDERATED_SENTINEL};

/// Identity handed over by the OAuth provider after its own email verification.
#[derive(Debug, Clone, Deserialize)]
pub struct FederatedProfile {
    pub email: String,
    pub display_name: String,
}

/// Creates a local account. The caller is expected to log the new user in.
#[instrument(skip(users, hasher, password))]
pub async fn register_local(
    users: &dyn UserStore,
    hasher: &Hasher,
    username: &str,
    email: &str,
    password: &str,
) -> Result<User> {
    if users.find_by_email(email).await?.is_some() {
        debug!("email already registered");
        return Err(AuthError::DuplicateEmail);
    }

    let hash = hasher.hash_blocking(password.to_owned()).await?;
    let user = users.insert(username, email, &hash).await?;
    info!(user_id = user.id, "user registered");
    Ok(user)
}

/// Checks an identifier (username or email) and password against the store.
#[instrument(skip(users, hasher, password))]
pub async fn authenticate_local(
    users: &dyn UserStore,
    hasher: &Hasher,
    identifier: &str,
    password: &str,
) -> Result<User> {
    let Some(user) = users.find_by_identifier(identifier).await? else {
        debug!("login unknown identifier");
        return Err(AuthError::NotFound);
    };

    if user.password_hash == FEDERATED_SENTINEL {
        debug!(user_id = user.id, "password login on federated account");
        return Err(AuthError::MustUseFederatedLogin);
    }

    let ok = hasher
        .verify_blocking(password.to_owned(), user.password_hash.clone())
        .await?;
    if !ok {
        warn!(user_id = user.id, "login invalid password");
        return Err(AuthError::InvalidCredential);
    }

    info!(user_id = user.id, "user logged in");
    Ok(user)
}

/// Maps a provider profile onto a local user, creating one on first login.
/// An existing account with the same email is returned as-is, whatever its origin.
#[instrument(skip(users, profile), fields(email = %profile.email))]
pub async fn authenticate_federated(users: &dyn UserStore, profile: &FederatedProfile) -> Result<User> {
    if let Some(user) = users.find_by_email(&profile.email).await? {
        if !user.is_federated() {
            info!(user_id = user.id, "federated login adopted local account");
        }
        return Ok(user);
    }

    match users
        .insert(&profile.display_name, &profile.email, FEDERATED_SENTINEL)
        .await
    {
        Ok(user) => {
            info!(user_id = user.id, "federated user created");
            Ok(user)
        }
        // Lost an insert race against a concurrent first login.
        Err(AuthError::DuplicateEmail) => users
            .find_by_email(&profile.email)
            .await?
            .ok_or(AuthError::NotFound),
        Err(e) => Err(e),
    }
}
