//! Session tokens and CSRF material.
//!
//! ARCHITECTURE
//! ============
//! Every browser gets a signed HS256 session token in an HttpOnly `auth`
//! cookie plus a JS-readable `csrf` cookie (double-submit pattern). API
//! requests must echo the CSRF cookie in a header; the WebSocket handshake
//! echoes it in a query parameter. Sessions are anonymous: the subject is a
//! random id minted when the cookie is first issued.
//!
//! The signing secret comes from the CLI when provided, otherwise from a
//! persistent file so sessions survive restarts; a missing file is filled
//! with a freshly generated secret.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session token lifetime.
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 3600);
/// Tokens closer to expiry than this are re-issued on the next request.
pub const REFRESH_THRESHOLD: Duration = Duration::from_secs(72 * 3600);
pub const ISSUER: &str = "miniflightradar";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("secret file error: {0}")]
    SecretFile(#[from] std::io::Error),
}

/// Session token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Random per-browser id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

// =============================================================================
// GATE
// =============================================================================

/// Signs and validates session tokens. Cheap to clone.
#[derive(Clone)]
pub struct AuthGate {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
}

impl AuthGate {
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: Arc::new(EncodingKey::from_secret(secret)),
            decoding: Arc::new(DecodingKey::from_secret(secret)),
        }
    }

    /// Build the gate from CLI configuration. Priority: explicit secret,
    /// then the secret file, then generate-and-persist.
    pub fn from_config(cli_secret: Option<&str>, secret_file: &Path) -> Result<Self, AuthError> {
        let secret = resolve_secret(cli_secret, secret_file)?;
        Ok(Self::new(&secret))
    }

    /// Sign a fresh session token with a random subject.
    pub fn sign_session(&self) -> Result<String, AuthError> {
        self.sign_session_at(&Uuid::new_v4().simple().to_string(), unix_now())
    }

    pub(crate) fn sign_session_at(&self, sub: &str, now: i64) -> Result<String, AuthError> {
        let claims = Claims {
            sub: sub.to_string(),
            iat: now,
            exp: now + as_secs(SESSION_TTL),
            iss: ISSUER.to_string(),
        };
        Ok(jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Decode and verify a session token. `None` for bad signatures,
    /// malformed tokens, and expired sessions.
    #[must_use]
    pub fn validate(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .ok()
    }
}

/// Whether a valid session is close enough to expiry to re-issue.
#[must_use]
pub fn needs_refresh(claims: &Claims, now: i64) -> bool {
    claims.exp - now < as_secs(REFRESH_THRESHOLD)
}

// =============================================================================
// SECRET RESOLUTION
// =============================================================================

fn resolve_secret(cli_secret: Option<&str>, secret_file: &Path) -> Result<Vec<u8>, AuthError> {
    if let Some(secret) = cli_secret.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(secret.as_bytes().to_vec());
    }

    if let Ok(contents) = std::fs::read_to_string(secret_file) {
        let trimmed = contents.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.as_bytes().to_vec());
        }
    }

    // Generate and persist (hex for readability) so sessions survive
    // restarts. Mode 0600: the secret gates every session cookie.
    if let Some(parent) = secret_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes: [u8; 32] = rand::rng().random();
    let hex = bytes_to_hex(&bytes);
    std::fs::write(secret_file, &hex)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(secret_file, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(hex.into_bytes())
}

// =============================================================================
// CSRF + HELPERS
// =============================================================================

/// Random 16-byte hex CSRF token.
#[must_use]
pub fn csrf_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes_to_hex(&bytes)
}

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Whether the request arrived over HTTPS, including behind a reverse
/// proxy (RFC 7239 `Forwarded` and the de-facto X-Forwarded-* headers).
#[must_use]
pub fn is_secure_request(headers: &HeaderMap) -> bool {
    if let Some(fwd) = header_str(headers, "forwarded") {
        if fwd.to_lowercase().contains("proto=https") {
            return true;
        }
    }
    if header_str(headers, "x-forwarded-proto").is_some_and(|v| v.eq_ignore_ascii_case("https")) {
        return true;
    }
    header_str(headers, "x-forwarded-ssl").is_some_and(|v| v.eq_ignore_ascii_case("on"))
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(0))
}

#[allow(clippy::cast_possible_wrap)]
fn as_secs(d: Duration) -> i64 {
    d.as_secs() as i64
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
