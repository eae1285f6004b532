use std::sync::Arc;
use std::time::Duration;

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use dashmap::DashMap;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ink_persistence::PlayerRepository;
use ink_types::{LoginRequest, Player, RegisterRequest, Session};

const MAX_USERNAME_LEN: usize = 32;
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String, // Player id
    pub name: String,
    pub iat: u64,
    pub exp: u64,
    pub jti: String,
}

/// Email/password accounts with bearer-token sessions. Tokens are HS256 JWTs
/// that must also still be present in the live session table, so logging out
/// revokes a token before it expires.
pub struct AuthService {
    players: Arc<PlayerRepository>,
    sessions: DashMap<String, Session>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl AuthService {
    pub fn new(players: Arc<PlayerRepository>, secret: &str, ttl: Duration) -> Self {
        Self {
            players,
            sessions: DashMap::new(),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<Session, AuthError> {
        let username = request.username.trim();
        if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
            return Err(AuthError::InvalidInput(format!(
                "username must be 1-{} characters",
                MAX_USERNAME_LEN
            )));
        }
        let email = request.email.trim();
        if !is_plausible_email(email) {
            return Err(AuthError::InvalidInput("email is invalid".to_string()));
        }
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        if self.players.email_taken(email).await? {
            return Err(AuthError::EmailTaken);
        }

        let player = self
            .players
            .create_player(username, email, &hash_password(&request.password)?)
            .await?;
        tracing::info!("Registered player {} ({})", player.username, player.id);

        self.issue_session(player)
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<Session, AuthError> {
        let record = self
            .players
            .find_by_email(&request.email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&request.password, &record.password_hash) {
            tracing::warn!("Failed login for {}", record.player.username);
            return Err(AuthError::InvalidCredentials);
        }

        self.issue_session(record.player)
    }

    /// Revokes `token`. Returns whether a live session was removed.
    pub fn logout(&self, token: &str) -> bool {
        let removed = self.sessions.remove(token);
        if let Some((_, session)) = &removed {
            tracing::info!("Player {} signed out", session.player.username);
        }
        removed.is_some()
    }

    pub fn validate_token(&self, token: &str) -> Result<Player, AuthError> {
        Ok(self.session(token)?.player)
    }

    pub fn session(&self, token: &str) -> Result<Session, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<SessionClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                JwtErrorKind::ExpiredSignature => {
                    self.sessions.remove(token);
                    AuthError::TokenExpired
                }
                _ => {
                    tracing::debug!("Rejected session token: {:?}", e);
                    AuthError::InvalidToken
                }
            }
        })?;

        self.sessions
            .get(token)
            .map(|session| session.clone())
            .ok_or(AuthError::InvalidToken)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Drops sessions past their expiry. Returns how many were removed.
    pub fn prune_expired_sessions(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            DateTime::parse_from_rfc3339(&session.expires_at)
                .map(|expires_at| expires_at > now)
                .unwrap_or(false)
        });
        before.saturating_sub(self.sessions.len())
    }

    fn issue_session(&self, player: Player) -> Result<Session, AuthError> {
        let now = Utc::now();
        let iat = now.timestamp().max(0) as u64;
        let exp = iat + self.ttl.as_secs();
        let claims = SessionClaims {
            sub: player.id.to_string(),
            name: player.username.clone(),
            iat,
            exp,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        let expires_at = Utc
            .timestamp_opt(exp as i64, 0)
            .single()
            .unwrap_or(now)
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let session = Session {
            token: token.clone(),
            player,
            created_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            expires_at,
        };
        self.sessions.insert(token, session.clone());
        Ok(session)
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn token_from_header(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

/// Argon2id PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| AuthError::Hashing(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Unparseable hashes never verify. The digest comparison is constant time.
pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored).is_ok_and(|hash| {
        Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok()
    })
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Email already registered")]
    EmailTaken,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Failed to sign token")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("Failed to hash password: {0}")]
    Hashing(String),
    #[error("Account storage failed: {0}")]
    Storage(#[from] anyhow::Error),
}
