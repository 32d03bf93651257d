//! Custom Axum extractors for request authentication.
//!
//! Provides `AuthenticatedUser`, which verifies the session bearer token in
//! the `Authorization` header. Token handling is delegated to
//! [`curio_sdk::session`].

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use curio_sdk::session::{self, SessionError};
use uuid::Uuid;

use crate::state::AppState;

/// The user a request acts for.
///
/// # Header format
///
/// ```text
/// Authorization: Bearer {user_id}.{issued_at}.{base64_signature}
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

/// Errors returned by the [`AuthenticatedUser`] extractor.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionRejection {
    MissingHeader,
    InvalidHeader,
    InvalidToken,
    Expired,
}

impl From<SessionError> for SessionRejection {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidFormat | SessionError::InvalidBase64 => Self::InvalidHeader,
            SessionError::SignatureMismatch => Self::InvalidToken,
            SessionError::Expired => Self::Expired,
        }
    }
}

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        let message = match self {
            SessionRejection::MissingHeader => "missing Authorization header",
            SessionRejection::InvalidHeader => "invalid Authorization header format",
            SessionRejection::InvalidToken => "session verification failed",
            SessionRejection::Expired => "session expired",
        };
        (StatusCode::UNAUTHORIZED, message).into_response()
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = SessionRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(SessionRejection::MissingHeader)?
            .to_str()
            .map_err(|_| SessionRejection::InvalidHeader)?;

        let token = session::parse_bearer(header_value)?;

        let settings = state.session.read().await;
        let user_id = session::verify_session_token(token, &settings.secret, settings.token_ttl)?;
        drop(settings);

        Ok(AuthenticatedUser(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;
    use axum::http::Request;

    async fn extract(header: Option<String>) -> Result<Uuid, SessionRejection> {
        let state = test_state();
        let mut builder = Request::builder().uri("/api/v1/orders");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthenticatedUser::from_request_parts(&mut parts, &state)
            .await
            .map(|user| user.0)
    }

    #[tokio::test]
    async fn test_valid_token_names_user() {
        let user = Uuid::new_v4();
        let token = session::issue_session_token(user, crate::api::TEST_SECRET);
        assert_eq!(extract(Some(format!("Bearer {token}"))).await, Ok(user));
    }

    #[tokio::test]
    async fn test_rejections() {
        assert_eq!(extract(None).await, Err(SessionRejection::MissingHeader));
        assert_eq!(
            extract(Some("Basic abc".to_string())).await,
            Err(SessionRejection::InvalidHeader)
        );

        let forged = session::issue_session_token(Uuid::new_v4(), b"another-secret");
        assert_eq!(
            extract(Some(format!("Bearer {forged}"))).await,
            Err(SessionRejection::InvalidToken)
        );

        let stale = session::issue_session_token_at(Uuid::new_v4(), 1_000, crate::api::TEST_SECRET);
        assert_eq!(
            extract(Some(format!("Bearer {stale}"))).await,
            Err(SessionRejection::Expired)
        );
    }
}
