use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::auth::error::{AuthError, Result};
use crate::config::PasswordConfig;

/// One-way password hashing with a configurable argon2id cost.
#[derive(Debug, Clone, Copy)]
pub struct Hasher {
    cost: PasswordConfig,
}

impl Hasher {
    pub fn new(cost: PasswordConfig) -> Self {
        Self { cost }
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.cost.memory_kib,
            self.cost.iterations,
            self.cost.parallelism,
            None,
        )
        .map_err(|e| {
            error!(error = %e, "invalid argon2 cost parameters");
            AuthError::HashComputationFailed(e.to_string())
        })?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    pub fn hash(&self, plain: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                AuthError::HashComputationFailed(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Cost parameters are read from the digest itself, so hashes made under an
    /// older configuration keep verifying. Only a mismatch is `Ok(false)`; a digest
    /// that cannot be compared is a fault.
    pub fn verify(&self, plain: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            AuthError::HashComputationFailed(e.to_string())
        })?;
        match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => {
                error!(error = %e, algorithm = %parsed.algorithm, "argon2 verify error");
                Err(AuthError::HashComputationFailed(e.to_string()))
            }
        }
    }

    pub async fn hash_blocking(&self, plain: String) -> Result<String> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .map_err(|e| AuthError::HashComputationFailed(e.to_string()))?
    }

    pub async fn verify_blocking(&self, plain: String, hash: String) -> Result<bool> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash))
            .await
            .map_err(|e| AuthError::HashComputationFailed(e.to_string()))?
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new(PasswordConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::FEDERATED_SENTINEL;

    fn cheap() -> Hasher {
        Hasher::new(PasswordConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let hasher = cheap();
        let hash = hasher.hash("Secur3P@ssw0rd!").expect("hashing should succeed");
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("Secur3P@ssw0rd!", &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hasher = cheap();
        let hash = hasher.hash("correct-horse-battery-staple").unwrap();
        assert!(!hasher.verify("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = cheap().verify("anything", "not-a-valid-hash").unwrap_err();
        assert!(matches!(err, AuthError::HashComputationFailed(_)));
    }

    #[test]
    fn sentinel_is_never_a_valid_digest() {
        let err = cheap().verify("google", FEDERATED_SENTINEL).unwrap_err();
        assert!(matches!(err, AuthError::HashComputationFailed(_)));
    }

    #[test]
    fn foreign_algorithm_digest_is_a_fault_not_a_mismatch() {
        let pbkdf2 = "$pbkdf2-sha256$i=1000$c2FsdHNhbHQ$aGFzaGhhc2hoYXNo";
        let err = cheap().verify("pw", pbkdf2).unwrap_err();
        assert!(matches!(err, AuthError::HashComputationFailed(_)));
    }

    #[tokio::test]
    async fn foreign_digest_fails_login_as_a_fault() {
        use crate::auth::memory::MemoryUserStore;
        use crate::auth::repo::UserStore;
        use crate::auth::strategy::authenticate_local;

        let users = MemoryUserStore::new();
        users
            .insert("alice", "a@x.com", "$pbkdf2-sha256$i=1000$c2FsdHNhbHQ$aGFzaGhhc2hoYXNo")
            .await
            .unwrap();
        let err = authenticate_local(&users, &cheap(), "a@x.com", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::HashComputationFailed(_)));
    }

    #[test]
    fn misconfigured_cost_fails_hashing() {
        let hasher = Hasher::new(PasswordConfig {
            memory_kib: 1,
            iterations: 0,
            parallelism: 0,
        });
        let err = hasher.hash("pw").unwrap_err();
        assert!(matches!(err, AuthError::HashComputationFailed(_)));
    }

    #[test]
    fn old_cost_hashes_still_verify() {
        let old = cheap().hash("pw1").unwrap();
        let newer = Hasher::new(PasswordConfig {
            memory_kib: 2048,
            iterations: 2,
            parallelism: 1,
        });
        assert!(newer.verify("pw1", &old).unwrap());
    }

    #[tokio::test]
    async fn blocking_variants_match() {
        let hasher = cheap();
        let hash = hasher.hash_blocking("pw1".into()).await.unwrap();
        assert!(hasher.verify_blocking("pw1".into(), hash.clone()).await.unwrap());
        assert!(!hasher.verify_blocking("pw2".into(), hash).await.unwrap());
    }
}
