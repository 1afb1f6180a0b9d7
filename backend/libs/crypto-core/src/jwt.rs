/// Shared JWT signing and validation for session tokens
///
/// Tokens are signed with HS256 using a server-held secret. Every token carries
/// a unique `jti` so that a single issuance can be revoked without touching any
/// other token belonging to the same user.
///
/// ## Security Design
///
/// - **HS256 ONLY**: the validator pins the algorithm, a token whose header
///   names any other algorithm is rejected
/// - **Minimum secret length**: secrets shorter than 32 bytes are refused
/// - **Zero leeway**: a token is expired the second after its `exp`
/// - **Issuer pinned**: tokens minted for another issuer are invalid
///
/// ## Usage
///
/// ```rust
/// use crypto_core::jwt::TokenSigner;
/// use uuid::Uuid;
///
/// let signer = TokenSigner::new(&"k".repeat(32), "session-service", 3600).unwrap();
/// let issued = signer.issue(Uuid::new_v4(), "user@example.com").unwrap();
/// let data = signer.validate(&issued.access_token).unwrap();
/// assert_eq!(data.claims.jti, issued.jti);
/// ```
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, TokenData,
    Validation,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Minimum accepted length of the signing secret in bytes
pub const MIN_SECRET_BYTES: usize = 32;

/// Default access token lifetime
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 3600;

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT secret too short: {0} bytes, at least {MIN_SECRET_BYTES} required")]
    SecretTooShort(usize),

    #[error("Invalid token TTL: {0} seconds")]
    InvalidTtl(i64),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Failed to encode token: {0}")]
    Encoding(String),
}

// ============================================================================
// Data Structures
// ============================================================================

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Email address of the subject at issuance
    pub email: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token id, the key used for revocation
    pub jti: String,
    /// Issuer
    pub iss: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub)
            .map_err(|e| JwtError::Invalid(format!("malformed subject: {e}")))
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        timestamp_to_datetime(self.iat)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        timestamp_to_datetime(self.exp)
    }
}

/// Result of a successful issuance, shaped for the login response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip)]
    pub jti: String,
    #[serde(skip)]
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Signer
// ============================================================================

/// Holds the HS256 keys and issuance policy.
///
/// Cheap to share behind an `Arc`; signing and validation take `&self` and
/// never block.
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("issuer", &self.issuer)
            .field("ttl_secs", &self.ttl.num_seconds())
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Build a signer from a shared secret.
    ///
    /// ## Errors
    ///
    /// - `SecretTooShort` if the secret is under [`MIN_SECRET_BYTES`]
    /// - `InvalidTtl` if `ttl_secs` is not positive
    pub fn new(secret: &str, issuer: impl Into<String>, ttl_secs: i64) -> Result<Self, JwtError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(JwtError::SecretTooShort(secret.len()));
        }
        if ttl_secs <= 0 {
            return Err(JwtError::InvalidTtl(ttl_secs));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            ttl: Duration::seconds(ttl_secs),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Issue an access token for `user_id`, valid from now for the configured TTL
    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<IssuedToken, JwtError> {
        self.issue_at(user_id, email, Utc::now())
    }

    /// Issue an access token as if it had been minted at `issued_at`.
    ///
    /// Used by [`TokenSigner::issue`]; exposed so callers can mint tokens with a
    /// known clock, e.g. already-expired tokens in tests.
    pub fn issue_at(
        &self,
        user_id: Uuid,
        email: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, JwtError> {
        let expires_at = issued_at + self.ttl;
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
        };

        let access_token = encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))?;

        Ok(IssuedToken {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: self.ttl.num_seconds(),
            expires_at: Some(claims.expires_at()),
            jti: claims.jti,
        })
    }

    /// Validate and decode a token.
    ///
    /// ## Errors
    ///
    /// - `Expired` when `exp` is in the past (signature already verified)
    /// - `Invalid` for bad signatures, malformed tokens, wrong algorithm or issuer
    pub fn validate(&self, token: &str) -> Result<TokenData<Claims>, JwtError> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);

        decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Invalid(e.to_string()),
        })
    }
}

fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ============================================================================
// Tests
// ============================================================================
