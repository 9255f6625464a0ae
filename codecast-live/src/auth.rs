use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::{Duration, Utc};
use codecast_core::random_string;
use rand::rngs::OsRng;
use std::sync::Arc;
use thiserror::Error;

use crate::{Database, DatabaseError, LiveContext, NewSession, NewUser, SessionData, UserData};

/// Account registration and login session management.
pub struct Auth {
    db: Arc<dyn Database>,
    argon: Argon2<'static>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Username or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

impl Auth {
    const SESSION_DURATION_IN_DAYS: usize = 7;

    pub fn new(context: &LiveContext) -> Self {
        Self {
            db: context.database.clone(),
            argon: Argon2::default(),
        }
    }

    /// Logs in a user, returning a new session
    pub async fn login(&self, credentials: Credentials) -> Result<SessionData, AuthError> {
        self.clear_expired().await;

        let user = self
            .db
            .user_by_username(&credentials.username)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound {
                    resource: _,
                    identifier: _,
                } => AuthError::InvalidCredentials,
                err => AuthError::Db(err),
            })?;

        let stored_password = PasswordHash::parse(&user.password, Encoding::default())
            .map_err(|e| AuthError::HashError(e.to_string()))?;

        self.argon
            .verify_password(credentials.password.as_bytes(), &stored_password)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let expires_at = Utc::now() + Duration::days(Self::SESSION_DURATION_IN_DAYS as i64);

        let new_session = NewSession {
            token: random_string(32),
            user_id: user.id,
            expires_at,
        };

        let new_session = self
            .db
            .create_session(new_session)
            .await
            .map_err(AuthError::Db)?;

        Ok(new_session)
    }

    /// Deletes the associated session, if it exists
    pub async fn logout(&self, token: &str) -> Result<(), DatabaseError> {
        self.db.delete_session_by_token(token).await
    }

    /// Creates an account
    pub async fn register(&self, new_account: NewAccount) -> Result<UserData, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hashed_password = self
            .argon
            .hash_password(new_account.password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashError(e.to_string()))?
            .to_string();

        self.db
            .create_user(NewUser {
                username: new_account.username,
                email: new_account.email,
                password: hashed_password,
                display_name: new_account.display_name,
            })
            .await
            .map_err(AuthError::Db)
    }

    /// Returns a session if it exists and hasn't expired
    pub async fn session(&self, token: &str) -> Result<SessionData, DatabaseError> {
        let session = self.db.session_by_token(token).await?;

        if session.expires_at <= Utc::now() {
            return Err(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            });
        }

        Ok(session)
    }

    async fn clear_expired(&self) {
        if let Err(e) = self.db.clear_expired_sessions().await {
            log::warn!("Failed to clear expired sessions: {e}");
        }
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Live, MemoryDatabase};
    use codecast_core::{ProviderConfig, SequenceUidGenerator, TokenIssuer};

    fn live() -> Live {
        let config = ProviderConfig::new("app".to_string(), "secret".to_string())
            .expect("config is valid");

        Live::new(
            Arc::new(MemoryDatabase::new()),
            TokenIssuer::new(config),
            Arc::new(SequenceUidGenerator::default()),
        )
    }

    fn account(username: &str) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            email: format!("{username}@codecast.dev"),
            password: "hunter2hunter2".to_string(),
            display_name: username.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let live = live();

        let user = live
            .auth
            .register(account("amara"))
            .await
            .expect("registration succeeds");

        assert!(!user.is_streamer);
        // Stored passwords are hashed
        assert_ne!(user.password, "hunter2hunter2");

        let session = live
            .auth
            .login(Credentials {
                username: "amara".to_string(),
                password: "hunter2hunter2".to_string(),
            })
            .await
            .expect("login succeeds");

        let resolved = live
            .auth
            .session(&session.token)
            .await
            .expect("session resolves");

        assert_eq!(resolved.user.id, user.id);
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let live = live();

        live.auth
            .register(account("amara"))
            .await
            .expect("registration succeeds");

        let result = live
            .auth
            .login(Credentials {
                username: "amara".to_string(),
                password: "wrong".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let live = live();

        live.auth
            .register(account("amara"))
            .await
            .expect("registration succeeds");

        let mut duplicate = account("amara");
        duplicate.email = "other@codecast.dev".to_string();

        let result = live.auth.register(duplicate).await;

        assert!(matches!(
            result,
            Err(AuthError::Db(DatabaseError::Conflict { .. }))
        ));
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let live = live();

        live.auth
            .register(account("amara"))
            .await
            .expect("registration succeeds");

        let session = live
            .auth
            .login(Credentials {
                username: "amara".to_string(),
                password: "hunter2hunter2".to_string(),
            })
            .await
            .expect("login succeeds");

        live.auth.logout(&session.token).await.expect("logout succeeds");

        assert!(live.auth.session(&session.token).await.is_err());
    }
}
