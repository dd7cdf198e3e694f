use crate::db;
use crate::domain::models::UserRole;
use crate::error::AppError;
use crate::state::SharedState;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    fn parse(raw: &str) -> Result<Self, SessionError> {
        match raw {
            "access" => Ok(TokenKind::Access),
            "refresh" => Ok(TokenKind::Refresh),
            _ => Err(SessionError::Invalid),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub role: UserRole,
    pub kind: TokenKind,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid token format")]
    Invalid,
    #[error("signature mismatch")]
    Signature,
    #[error("expired")]
    Expired,
    #[error("bad role")]
    Role,
    #[error("wrong token kind")]
    Kind,
}

/// Payload is `user_id|role|kind|exp`, signed with HMAC-SHA256.
pub fn sign_token(
    user_id: Uuid,
    role: UserRole,
    kind: TokenKind,
    ttl: Duration,
    key: &[u8],
) -> Result<String, SessionError> {
    let exp = Utc::now() + ttl;
    let payload = format!(
        "{}|{}|{}|{}",
        user_id,
        role.as_str(),
        kind.as_str(),
        exp.timestamp()
    );
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    let token = format!(
        "{}.{}",
        general_purpose::STANDARD.encode(payload.as_bytes()),
        general_purpose::STANDARD.encode(sig)
    );
    Ok(token)
}

pub fn verify_token(token: &str, key: &[u8]) -> Result<SessionClaims, SessionError> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(SessionError::Invalid)?;
    let payload_bytes = general_purpose::STANDARD
        .decode(payload_b64)
        .map_err(|_| SessionError::Invalid)?;
    let sig_bytes = general_purpose::STANDARD
        .decode(sig_b64)
        .map_err(|_| SessionError::Invalid)?;

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(&payload_bytes);
    mac.verify_slice(&sig_bytes)
        .map_err(|_| SessionError::Signature)?;

    let payload = String::from_utf8(payload_bytes).map_err(|_| SessionError::Invalid)?;
    let pieces: Vec<&str> = payload.split('|').collect();
    if pieces.len() != 4 {
        return Err(SessionError::Invalid);
    }
    let user_id = Uuid::parse_str(pieces[0]).map_err(|_| SessionError::Invalid)?;
    let role = UserRole::try_from(pieces[1]).map_err(|_| SessionError::Role)?;
    let kind = TokenKind::parse(pieces[2])?;
    let exp: i64 = pieces[3].parse().map_err(|_| SessionError::Invalid)?;
    if Utc::now().timestamp() > exp {
        return Err(SessionError::Expired);
    }
    Ok(SessionClaims {
        user_id,
        role,
        kind,
        exp,
    })
}

/// Verifies the token and requires it to be of the given kind.
pub fn verify_kind(
    token: &str,
    key: &[u8],
    kind: TokenKind,
) -> Result<SessionClaims, SessionError> {
    let claims = verify_token(token, key)?;
    if claims.kind != kind {
        return Err(SessionError::Kind);
    }
    Ok(claims)
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

pub fn issue_pair(
    state: &SharedState,
    user_id: Uuid,
    role: UserRole,
) -> Result<TokenPair, SessionError> {
    let access_ttl = state.config.access_token_ttl;
    Ok(TokenPair {
        access_token: sign_token(user_id, role, TokenKind::Access, access_ttl, &state.session_key)?,
        refresh_token: sign_token(
            user_id,
            role,
            TokenKind::Refresh,
            state.config.refresh_token_ttl,
            &state.session_key,
        )?,
        token_type: "Bearer",
        expires_in: access_ttl.num_seconds(),
    })
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(val) = auth.to_str() {
            if let Some(bearer) = val.strip_prefix("Bearer ") {
                return Some(bearer.trim().to_string());
            }
        }
    }
    if let Some(cookie) = headers.get(axum::http::header::COOKIE) {
        if let Ok(val) = cookie.to_str() {
            for pair in val.split(';') {
                let trimmed = pair.trim();
                if let Some(rest) = trimmed.strip_prefix("session=") {
                    return Some(rest.to_string());
                }
            }
        }
    }
    None
}

// ============================================
// Axum extractor for the authenticated user
// ============================================

/// Authenticated caller, reloaded from the database on every request so
/// deactivated users and role changes take effect immediately.
///
/// ```ignore
/// async fn handler(user: CurrentUser) -> AppResult<...> {
///     user.require_admin()?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub role: UserRole,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Administrator role required".to_string()))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    SharedState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let shared_state = SharedState::from_ref(state);

        let token = extract_token(&parts.headers).ok_or(AppError::Unauthorized)?;

        let claims = verify_kind(&token, &shared_state.session_key, TokenKind::Access).map_err(|e| {
            tracing::warn!("Session verification failed: {}", e);
            AppError::Unauthorized
        })?;

        let user = db::find_user_by_id(&shared_state.pool, claims.user_id)
            .await
            .map_err(|e| {
                tracing::warn!("User lookup failed for session: {}", e);
                AppError::Unauthorized
            })?;

        let Some(user) = user else {
            return Err(AppError::Unauthorized);
        };

        if !user.is_active {
            return Err(AppError::Unauthorized);
        }

        Ok(CurrentUser {
            id: user.id,
            role: user.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn signed_token_verifies_with_same_key() {
        let user_id = Uuid::new_v4();
        let token =
            sign_token(user_id, UserRole::Student, TokenKind::Access, Duration::hours(1), KEY)
                .unwrap();
        let claims = verify_token(&token, KEY).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.role, UserRole::Student);
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn tampered_or_foreign_tokens_are_rejected() {
        let token = sign_token(
            Uuid::new_v4(),
            UserRole::Student,
            TokenKind::Access,
            Duration::hours(1),
            KEY,
        )
        .unwrap();
        assert!(matches!(
            verify_token(&token, b"another-key-another-key-another!"),
            Err(SessionError::Signature)
        ));

        let (_, sig) = token.split_once('.').unwrap();
        let forged_payload = format!("{}|admin|access|{}", Uuid::new_v4(), i64::MAX);
        let forged = format!("{}.{}", general_purpose::STANDARD.encode(forged_payload), sig);
        assert!(matches!(verify_token(&forged, KEY), Err(SessionError::Signature)));

        assert!(matches!(verify_token("garbage", KEY), Err(SessionError::Invalid)));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let token = sign_token(
            Uuid::new_v4(),
            UserRole::Admin,
            TokenKind::Access,
            Duration::seconds(-5),
            KEY,
        )
        .unwrap();
        assert!(matches!(verify_token(&token, KEY), Err(SessionError::Expired)));
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let token = sign_token(
            Uuid::new_v4(),
            UserRole::Student,
            TokenKind::Refresh,
            Duration::days(7),
            KEY,
        )
        .unwrap();
        assert!(matches!(
            verify_kind(&token, KEY, TokenKind::Access),
            Err(SessionError::Kind)
        ));
        assert!(verify_kind(&token, KEY, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn token_is_read_from_bearer_or_cookie() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert(axum::http::header::COOKIE, "theme=dark; session=abc.def".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(axum::http::header::AUTHORIZATION, "Bearer xyz.123".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("xyz.123"));
    }

    #[test]
    fn only_admins_pass_the_admin_guard() {
        let admin = CurrentUser { id: Uuid::new_v4(), role: UserRole::Admin };
        let student = CurrentUser { id: Uuid::new_v4(), role: UserRole::Student };
        assert!(admin.require_admin().is_ok());
        assert!(matches!(student.require_admin(), Err(AppError::Forbidden(_))));
    }
}
