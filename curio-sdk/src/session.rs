//! Session token signing and verification.
//!
//! Authenticated requests carry a bearer token in the `Authorization` header:
//!
//! ```text
//! Authorization: Bearer {user_id}.{issued_at}.{base64_signature}
//! ```
//!
//! The signature is `HMAC-SHA256("{user_id}.{issued_at}", session_secret)`.
//! Tokens are issued by the login flow and checked by the order service.

use uuid::Uuid;

/// Scheme prefix of the `Authorization` header value.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Default maximum age of a session token (in seconds).
pub const DEFAULT_SESSION_TTL: i64 = 24 * 60 * 60;

/// Errors produced by session token operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("invalid token format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("session expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SessionError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

fn signing_key(secret: &[u8]) -> ring::hmac::Key {
    ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret)
}

/// Issue a token for `user_id`, stamped with the current time.
pub fn issue_session_token(user_id: Uuid, secret: &[u8]) -> String {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    issue_session_token_at(user_id, now, secret)
}

/// Issue a token for `user_id` with an explicit `issued_at` unix timestamp.
pub fn issue_session_token_at(user_id: Uuid, issued_at: i64, secret: &[u8]) -> String {
    let data = format!("{user_id}.{issued_at}");
    let sig = ring::hmac::sign(&signing_key(secret), data.as_bytes());
    format!(
        "{data}.{}",
        fast32::base64::RFC4648_NOPAD.encode(sig.as_ref())
    )
}

/// Verify a token against the current time and return the user it names.
pub fn verify_session_token(token: &str, secret: &[u8], max_age: i64) -> Result<Uuid, SessionError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    verify_session_token_at(token, secret, max_age, now)
}

/// Verify a token as of `now`.
///
/// The signature is checked before the age so that a forged token never
/// reports `Expired`.
pub fn verify_session_token_at(
    token: &str,
    secret: &[u8],
    max_age: i64,
    now: i64,
) -> Result<Uuid, SessionError> {
    let (data, encoded_sig) = token.rsplit_once('.').ok_or(SessionError::InvalidFormat)?;
    let (user_part, issued_part) = data.split_once('.').ok_or(SessionError::InvalidFormat)?;
    let user_id: Uuid = user_part.parse().map_err(|_| SessionError::InvalidFormat)?;
    let issued_at: i64 = issued_part
        .parse()
        .map_err(|_| SessionError::InvalidFormat)?;
    let signature = fast32::base64::RFC4648_NOPAD
        .decode_str(encoded_sig)
        .map_err(|_| SessionError::InvalidBase64)?;

    ring::hmac::verify(&signing_key(secret), data.as_bytes(), &signature)?;

    if now - issued_at > max_age || issued_at > now + 60 {
        return Err(SessionError::Expired);
    }
    Ok(user_id)
}

/// Strip the `Bearer ` prefix from an `Authorization` header value.
pub fn parse_bearer(header_value: &str) -> Result<&str, SessionError> {
    header_value
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(SessionError::InvalidFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"curio-session-secret";

    #[test]
    fn test_issued_token_verifies() {
        let user = Uuid::new_v4();
        let token = issue_session_token_at(user, 1_700_000_000, SECRET);
        let verified = verify_session_token_at(&token, SECRET, 3600, 1_700_000_100).unwrap();
        assert_eq!(verified, user);
    }

    #[test]
    fn test_tampered_user_is_rejected() {
        let token = issue_session_token_at(Uuid::new_v4(), 1_700_000_000, SECRET);
        let (_, rest) = token.split_once('.').unwrap();
        let forged = format!("{}.{rest}", Uuid::new_v4());
        assert_eq!(
            verify_session_token_at(&forged, SECRET, 3600, 1_700_000_100),
            Err(SessionError::SignatureMismatch)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = issue_session_token_at(Uuid::new_v4(), 1_700_000_000, SECRET);
        assert_eq!(
            verify_session_token_at(&token, b"other", 3600, 1_700_000_100),
            Err(SessionError::SignatureMismatch)
        );
    }

    #[test]
    fn test_old_token_is_expired() {
        let token = issue_session_token_at(Uuid::new_v4(), 1_700_000_000, SECRET);
        assert_eq!(
            verify_session_token_at(&token, SECRET, 3600, 1_700_003_601),
            Err(SessionError::Expired)
        );
    }

    #[test]
    fn test_garbage_is_invalid_format() {
        assert_eq!(
            verify_session_token_at("not-a-token", SECRET, 3600, 0),
            Err(SessionError::InvalidFormat)
        );
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc.def").unwrap(), "abc.def");
        assert!(parse_bearer("Basic abc").is_err());
        assert!(parse_bearer("Bearer ").is_err());
    }
}
