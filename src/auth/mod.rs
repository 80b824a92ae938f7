// auth/mod.rs - Bearer credential verification
//
// Tokens are minted elsewhere; this module only checks them. Two key modes:
// a shared HS256 secret, or an RS256 public key read from disk. In the
// asymmetric mode the caller names the key it signed against by fingerprint,
// and the request is refused before any signature work if that fingerprint
// is not the one of the key on disk.

pub mod roles;

use std::path::{Path, PathBuf};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl Claims {
    pub fn new(role: Option<String>, id: Option<String>) -> Self {
        Self {
            role,
            id,
            ..Default::default()
        }
    }

    /// Role claim, falling back to the default role
    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or(roles::DEFAULT_ROLE)
    }

    /// Identity of the caller (`id`, else `sub`)
    pub fn subject(&self) -> Option<&str> {
        self.id.as_deref().or(self.sub.as_deref())
    }
}

/// How tokens are signed
#[derive(Clone)]
pub enum KeyMode {
    Symmetric {
        secret: String,
    },
    Asymmetric {
        public_key_path: PathBuf,
        /// Only needed to mint development tokens
        private_key_path: Option<PathBuf>,
    },
}

impl std::fmt::Debug for KeyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMode::Symmetric { .. } => f.write_str("Symmetric { secret: <redacted> }"),
            KeyMode::Asymmetric { public_key_path, private_key_path } => f
                .debug_struct("Asymmetric")
                .field("public_key_path", public_key_path)
                .field("private_key_path", private_key_path)
                .finish(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("Authorization header must use Bearer token format")]
    MalformedHeader,

    #[error("Missing key fingerprint")]
    MissingFingerprint,

    #[error("Key fingerprint does not match the trusted key")]
    FingerprintMismatch,

    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid JWT token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// Verifies (and for development, issues) bearer tokens with the configured keys
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    mode: KeyMode,
}

impl TokenVerifier {
    pub fn new(mode: KeyMode) -> Self {
        Self { mode }
    }

    /// Check the token signature (and expiry, when the token carries one)
    pub async fn verify(&self, token: &str, fingerprint: Option<&str>) -> Result<Claims, AuthError> {
        match &self.mode {
            KeyMode::Symmetric { secret } => {
                let key = DecodingKey::from_secret(secret.as_bytes());
                Ok(decode::<Claims>(token, &key, &validation(Algorithm::HS256))?.claims)
            }
            KeyMode::Asymmetric { public_key_path, .. } => {
                let supplied = fingerprint.ok_or(AuthError::MissingFingerprint)?;

                // Re-read on every call so key rotation needs no restart
                let pem = read_key(public_key_path).await?;
                if !supplied.trim().eq_ignore_ascii_case(&key_fingerprint(&pem)) {
                    return Err(AuthError::FingerprintMismatch);
                }

                let key = DecodingKey::from_rsa_pem(&pem).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
                Ok(decode::<Claims>(token, &key, &validation(Algorithm::RS256))?.claims)
            }
        }
    }

    /// Sign `claims` with the configured key
    pub async fn issue(&self, claims: &Claims) -> Result<String, AuthError> {
        match &self.mode {
            KeyMode::Symmetric { secret } => {
                let key = EncodingKey::from_secret(secret.as_bytes());
                Ok(encode(&Header::new(Algorithm::HS256), claims, &key)?)
            }
            KeyMode::Asymmetric { private_key_path, .. } => {
                let path = private_key_path
                    .as_ref()
                    .ok_or_else(|| AuthError::KeyUnavailable("no private key configured".to_string()))?;
                let pem = read_key(path).await?;
                let key = EncodingKey::from_rsa_pem(&pem).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
                Ok(encode(&Header::new(Algorithm::RS256), claims, &key)?)
            }
        }
    }
}

fn validation(algorithm: Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    // Tokens without `exp` are accepted; `exp` is still enforced when present
    validation.required_spec_claims.clear();
    validation
}

async fn read_key(path: &Path) -> Result<Vec<u8>, AuthError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| AuthError::KeyUnavailable(format!("{}: {}", path.display(), e)))
}

/// SHA-256 of the key file, lowercase hex
pub fn key_fingerprint(key: &[u8]) -> String {
    Sha256::digest(key)
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}
