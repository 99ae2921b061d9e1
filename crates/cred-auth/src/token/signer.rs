//! JWT signing and signature verification.
//!
//! The engine only talks to the [`TokenSigner`] trait. [`JwtSigner`] is the
//! bundled implementation on top of `jsonwebtoken`, supporting:
//!
//! - **HS256 / HS384 / HS512**: HMAC with a shared secret
//! - **RS256 / RS384 / RS512**: RSA, PEM private key to sign, PEM public key to verify
//! - **ES256 / ES384**: ECDSA (P-256 / P-384), PKCS#8 PEM private key, SPKI PEM public key

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::claims::Claims;
use crate::config::TokenKeyConfig;
use crate::error::{AuthError, InvalidTokenReason};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The `iss` claim does not match.
    #[error("Invalid issuer")]
    InvalidIssuer,

    /// The header names a different algorithm.
    #[error("Invalid algorithm")]
    InvalidAlgorithm,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// This signer holds no private key.
    #[error("Signer cannot issue tokens: {message}")]
    SigningUnavailable {
        /// Which key is missing.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if the failure is due to the presented token rather
    /// than to this signer's keys.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        !matches!(
            self,
            Self::EncodingError { .. } | Self::SigningUnavailable { .. } | Self::InvalidKey { .. }
        )
    }

    /// Maps a validation failure to the rejection reason reported to callers.
    #[must_use]
    pub fn reason(&self) -> InvalidTokenReason {
        match self {
            Self::Expired => InvalidTokenReason::Expired,
            Self::InvalidSignature => InvalidTokenReason::BadSignature,
            Self::InvalidIssuer => InvalidTokenReason::WrongIssuer,
            Self::InvalidAlgorithm => InvalidTokenReason::WrongAlgorithm,
            _ => InvalidTokenReason::Malformed,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            ErrorKind::InvalidAlgorithm => Self::InvalidAlgorithm,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::decoding_error(err.to_string()),
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        if err.is_validation_error() {
            AuthError::invalid_token(err.reason(), err.to_string())
        } else {
            AuthError::signing(err.to_string())
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256.
    HS256,
    /// HMAC with SHA-384.
    #[default]
    HS384,
    /// HMAC with SHA-512.
    HS512,
    /// RSA PKCS#1 v1.5 with SHA-256.
    RS256,
    /// RSA PKCS#1 v1.5 with SHA-384.
    RS384,
    /// RSA PKCS#1 v1.5 with SHA-512.
    RS512,
    /// ECDSA with P-256 and SHA-256.
    ES256,
    /// ECDSA with P-384 and SHA-384.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::HS384 => Algorithm::HS384,
            Self::HS512 => Algorithm::HS512,
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::RS512 => Algorithm::RS512,
            Self::ES256 => Algorithm::ES256,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` for HMAC algorithms.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::HS256 | Self::HS384 | Self::HS512)
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384 | Self::RS512)
    }

    /// Returns `true` if this is an EC-based algorithm.
    #[must_use]
    pub fn is_ec(&self) -> bool {
        matches!(self, Self::ES256 | Self::ES384)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Signer trait
// ============================================================================

/// Produces and checks signed tokens.
///
/// Implementations must validate the signature, the `iss` claim, the header
/// algorithm and `exp` (no leeway) in [`verify`](TokenSigner::verify).
#[async_trait]
pub trait TokenSigner: Send + Sync {
    /// Algorithm this signer uses.
    fn algorithm(&self) -> SigningAlgorithm;

    /// Signs the claims into a compact token.
    async fn sign(&self, claims: &Claims) -> Result<String, JwtError>;

    /// Verifies a token issued by `issuer` and returns its claims.
    async fn verify(&self, token: &str, issuer: &str) -> Result<Claims, JwtError>;
}

// ============================================================================
// JWT Signer
// ============================================================================

struct Keys {
    algorithm: SigningAlgorithm,
    encoding_key: Option<EncodingKey>,
    decoding_key: Option<DecodingKey>,
}

/// `jsonwebtoken`-backed [`TokenSigner`].
///
/// Cheap to clone. Signing and verification run on the blocking pool since
/// RSA operations take long enough to stall a runtime worker.
#[derive(Clone)]
pub struct JwtSigner {
    keys: Arc<Keys>,
}

impl JwtSigner {
    /// Creates an HMAC signer.
    ///
    /// # Errors
    /// Returns an error if `algorithm` is not an HS* algorithm.
    pub fn hmac(algorithm: SigningAlgorithm, secret: &[u8]) -> Result<Self, JwtError> {
        if !algorithm.is_symmetric() {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {algorithm} requires a key pair, not a secret"
            )));
        }

        Ok(Self::from_keys(
            algorithm,
            Some(EncodingKey::from_secret(secret)),
            Some(DecodingKey::from_secret(secret)),
        ))
    }

    /// Creates an asymmetric signer from PEM strings.
    ///
    /// Either key may be omitted: without a private key the signer can only
    /// verify, without a public key it can only sign.
    ///
    /// # Errors
    /// Returns an error if the algorithm is symmetric, both keys are missing,
    /// or the PEM data is invalid.
    pub fn from_pem(
        algorithm: SigningAlgorithm,
        private_pem: Option<&str>,
        public_pem: Option<&str>,
    ) -> Result<Self, JwtError> {
        if algorithm.is_symmetric() {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {algorithm} uses a shared secret, not PEM keys"
            )));
        }
        if private_pem.is_none() && public_pem.is_none() {
            return Err(JwtError::invalid_key("No private or public key given"));
        }

        let encoding_key = private_pem
            .map(|pem| {
                if algorithm.is_rsa() {
                    EncodingKey::from_rsa_pem(pem.as_bytes())
                } else {
                    EncodingKey::from_ec_pem(pem.as_bytes())
                }
            })
            .transpose()
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        let decoding_key = public_pem
            .map(|pem| {
                if algorithm.is_rsa() {
                    DecodingKey::from_rsa_pem(pem.as_bytes())
                } else {
                    DecodingKey::from_ec_pem(pem.as_bytes())
                }
            })
            .transpose()
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        Ok(Self::from_keys(algorithm, encoding_key, decoding_key))
    }

    /// Creates a signer from one side of the issuer configuration.
    ///
    /// # Errors
    /// Returns an error if the key material does not fit the algorithm.
    pub fn from_config(config: &TokenKeyConfig) -> Result<Self, JwtError> {
        if config.algorithm.is_symmetric() {
            let secret = config
                .secret
                .as_deref()
                .ok_or_else(|| JwtError::invalid_key("Missing secret"))?;
            Self::hmac(config.algorithm, secret.as_bytes())
        } else {
            Self::from_pem(
                config.algorithm,
                config.private_key.as_deref(),
                config.public_key.as_deref(),
            )
        }
    }

    fn from_keys(
        algorithm: SigningAlgorithm,
        encoding_key: Option<EncodingKey>,
        decoding_key: Option<DecodingKey>,
    ) -> Self {
        Self {
            keys: Arc::new(Keys {
                algorithm,
                encoding_key,
                decoding_key,
            }),
        }
    }

    /// Returns `true` if this signer holds a private key or secret.
    #[must_use]
    pub fn can_sign(&self) -> bool {
        self.keys.encoding_key.is_some()
    }

    /// Returns `true` if this signer holds a public key or secret.
    #[must_use]
    pub fn can_verify(&self) -> bool {
        self.keys.decoding_key.is_some()
    }

    fn encode_blocking(keys: &Keys, claims: &Claims) -> Result<String, JwtError> {
        let key = keys
            .encoding_key
            .as_ref()
            .ok_or_else(|| JwtError::SigningUnavailable {
                message: format!("no private key configured for {}", keys.algorithm),
            })?;

        let header = Header::new(keys.algorithm.to_jwt_algorithm());
        encode(&header, claims, key).map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    fn decode_blocking(keys: &Keys, token: &str, issuer: &str) -> Result<Claims, JwtError> {
        let key = keys
            .decoding_key
            .as_ref()
            .ok_or_else(|| JwtError::invalid_key("no public key configured"))?;

        let mut validation = Validation::new(keys.algorithm.to_jwt_algorithm());
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 0;

        decode::<Claims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(JwtError::from)
    }
}

impl fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSigner")
            .field("algorithm", &self.keys.algorithm)
            .field("can_sign", &self.can_sign())
            .field("can_verify", &self.can_verify())
            .finish()
    }
}

#[async_trait]
impl TokenSigner for JwtSigner {
    fn algorithm(&self) -> SigningAlgorithm {
        self.keys.algorithm
    }

    async fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        let keys = Arc::clone(&self.keys);
        let claims = claims.clone();

        tokio::task::spawn_blocking(move || Self::encode_blocking(&keys, &claims))
            .await
            .map_err(|e| JwtError::encoding_error(format!("signing task failed: {e}")))?
    }

    async fn verify(&self, token: &str, issuer: &str) -> Result<Claims, JwtError> {
        let keys = Arc::clone(&self.keys);
        let token = token.to_owned();
        let issuer = issuer.to_owned();

        tokio::task::spawn_blocking(move || Self::decode_blocking(&keys, &token, &issuer))
            .await
            .map_err(|e| JwtError::decoding_error(format!("verification task failed: {e}")))?
    }
}

// ============================================================================
// Tests
// ============================================================================
