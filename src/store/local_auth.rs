//! Password sessions for self-hosted deployments.
//!
//! Accounts are bcrypt hashes held in memory; sessions are HS256 access
//! tokens. Signing out records the token hash until the token would have
//! expired anyway.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuthProvider, AuthUser, DataStore, Session, StoreError};
use crate::config::AppConfig;

/// Access token expiry in minutes
const ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 60;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct LocalAccount {
    pub id: String,
    pub email: String,
    pub password_hash: String,
}

impl LocalAccount {
    /// Account ids are stable across restarts: derived from the email.
    pub fn new(email: &str, password_hash: String) -> Self {
        let email = email.trim().to_lowercase();
        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, email.as_bytes()).to_string(),
            email,
            password_hash,
        }
    }
}

pub struct LocalAuth {
    secret: String,
    accounts: HashMap<String, LocalAccount>,
    /// sha256(token) -> exp of signed-out tokens
    revoked: RwLock<HashMap<String, i64>>,
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl LocalAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            accounts: HashMap::new(),
            revoked: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_account(mut self, account: LocalAccount) -> Self {
        self.accounts.insert(account.email.clone(), account);
        self
    }

    pub fn account(&self, email: &str) -> Option<&LocalAccount> {
        self.accounts.get(&email.trim().to_lowercase())
    }

    /// Bootstrap from `ADMIN_EMAIL` plus `ADMIN_PASSWORD_HASH` or
    /// `ADMIN_PASSWORD`, and make sure that account has an admin profile.
    pub async fn from_app(
        config: &AppConfig,
        data: Arc<dyn DataStore>,
    ) -> Result<Self, StoreError> {
        let auth = Self::new(config.store_api_key.clone());

        let email = match &config.admin_email {
            Some(email) => email.clone(),
            None => {
                tracing::warn!("ADMIN_EMAIL not set; no account can sign in");
                return Ok(auth);
            }
        };

        let password_hash = if let Some(hash) = &config.admin_password_hash {
            hash.clone()
        } else if let Some(plain) = config.admin_password.clone() {
            tokio::task::spawn_blocking(move || hash(&plain, DEFAULT_COST))
                .await
                .map_err(|e| StoreError::Transport(format!("hash task failed: {}", e)))?
                .map_err(|e| StoreError::Transport(format!("password hashing failed: {}", e)))?
        } else {
            tracing::warn!("ADMIN_PASSWORD not set; no account can sign in");
            return Ok(auth);
        };

        let account = LocalAccount::new(&email, password_hash);
        let profile = json!({ "id": account.id, "role": "admin" });
        if let serde_json::Value::Object(row) = profile {
            data.upsert("profiles", row, "id").await?;
        }
        tracing::info!(email = %account.email, "Local admin account ready");

        Ok(auth.with_account(account))
    }

    fn create_access_token(&self, account: &LocalAccount) -> Result<(String, i64), StoreError> {
        let now = Utc::now();
        let exp = (now + Duration::minutes(ACCESS_TOKEN_EXPIRY_MINUTES)).timestamp();

        let claims = Claims {
            sub: account.id.clone(),
            email: account.email.clone(),
            role: "authenticated".to_string(),
            exp,
            iat: now.timestamp(),
            jti: Alphanumeric.sample_string(&mut rand::rng(), 16),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| StoreError::Transport(format!("token signing failed: {}", e)))?;
        Ok((token, exp))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}

#[async_trait]
impl AuthProvider for LocalAuth {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, StoreError> {
        let account = self
            .account(email)
            .cloned()
            .ok_or(StoreError::InvalidCredentials)?;

        let password = password.to_string();
        let stored_hash = account.password_hash.clone();
        let password_ok = tokio::task::spawn_blocking(move || {
            verify(&password, &stored_hash).unwrap_or(false)
        })
        .await
        .unwrap_or(false);

        if !password_ok {
            tracing::warn!(email = %account.email, "Login failed: invalid password");
            return Err(StoreError::InvalidCredentials);
        }

        let (access_token, expires_at) = self.create_access_token(&account)?;
        tracing::info!(email = %account.email, "Login successful");

        Ok(Session {
            access_token,
            refresh_token: None,
            expires_at: Some(expires_at),
            user: AuthUser {
                id: account.id,
                email: Some(account.email),
            },
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), StoreError> {
        // Unknown or expired tokens have nothing to revoke.
        let Ok(claims) = self.verify_access_token(access_token) else {
            return Ok(());
        };

        let now = Utc::now().timestamp();
        let mut revoked = self.revoked.write().await;
        revoked.retain(|_, exp| *exp > now);
        revoked.insert(hash_token(access_token), claims.exp);
        Ok(())
    }

    async fn get_session(&self, access_token: &str) -> Result<Option<Session>, StoreError> {
        let claims = match self.verify_access_token(access_token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!("Access token rejected: {}", e);
                return Ok(None);
            }
        };

        if self.revoked.read().await.contains_key(&hash_token(access_token)) {
            return Ok(None);
        }

        Ok(Some(Session {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at: Some(claims.exp),
            user: AuthUser {
                id: claims.sub,
                email: Some(claims.email),
            },
        }))
    }
}
