pub mod auth;
pub mod careers;
pub mod evaluation_config;
pub mod evaluations;
pub mod questionnaires;
pub mod questions;
pub mod reports;
pub mod sections;
pub mod session;
pub mod users;
pub mod validation;

use crate::db::catalog::Deletion;
use crate::error::{AppError, AppResult};
use crate::state::SharedState;
use axum::{http::StatusCode, routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

/// 204 once removed; 409 while evaluations still reference the row.
pub(crate) fn deletion_response(deletion: Deletion, what: &str) -> AppResult<StatusCode> {
    match deletion {
        Deletion::Deleted => Ok(StatusCode::NO_CONTENT),
        Deletion::Missing => Err(AppError::not_found(what)),
        Deletion::InUse => Err(AppError::Conflict(format!(
            "{what} is referenced by existing evaluations and cannot be deleted"
        ))),
    }
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(state.clone()))
        .nest("/users", users::router(state.clone()))
        .nest("/careers", careers::router(state.clone()))
        .nest("/sections", sections::router(state.clone()))
        .nest("/questionnaires", questionnaires::router(state.clone()))
        .nest("/questions", questions::router(state.clone()))
        .nest("/evaluation-config", evaluation_config::router(state.clone()))
        .nest("/evaluations", evaluations::router(state.clone()))
        .nest("/reports", reports::router(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::models::UserRole;
    use crate::state::AppState;
    use crate::web::session::{sign_token, TokenKind};
    use axum::body::Body;
    use axum::http::{header, Request};
    use base64::{engine::general_purpose, Engine as _};
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    const KEY: [u8; 32] = [42u8; 32];

    /// Router over a pool that never connects: only paths rejected before
    /// touching the database can be exercised here.
    fn app() -> Router {
        let key = general_purpose::STANDARD.encode(KEY);
        let config = Config::from_lookup(|name| match name {
            "DATABASE_URL" => Some("postgres://localhost:1/unused".to_string()),
            "SESSION_KEY" => Some(key.clone()),
            _ => None,
        })
        .unwrap();
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let state: SharedState = Arc::new(AppState {
            pool,
            session_key: config.session_key.clone(),
            config,
        });
        routes(state)
    }

    async fn status_of(request: Request<Body>) -> StatusCode {
        app().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn health_is_public() {
        let request = Request::get("/health").body(Body::empty()).unwrap();
        assert_eq!(status_of(request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        for uri in ["/evaluations", "/users/profile", "/reports/individual", "/evaluation-config"] {
            let request = Request::get(uri).body(Body::empty()).unwrap();
            assert_eq!(status_of(request).await, StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn forged_and_refresh_tokens_are_not_access_tokens() {
        let request = Request::get("/evaluations")
            .header(header::AUTHORIZATION, "Bearer not.a-token")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::UNAUTHORIZED);

        let refresh = sign_token(
            Uuid::new_v4(),
            UserRole::Admin,
            TokenKind::Refresh,
            chrono::Duration::days(1),
            &KEY,
        )
        .unwrap();
        let request = Request::get("/evaluations")
            .header(header::AUTHORIZATION, format!("Bearer {refresh}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_rejects_access_tokens() {
        let access = sign_token(
            Uuid::new_v4(),
            UserRole::Student,
            TokenKind::Access,
            chrono::Duration::hours(1),
            &KEY,
        )
        .unwrap();
        let request = Request::post("/auth/refresh")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(r#"{{"refresh_token":"{access}"}}"#)))
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn registration_outside_the_institution_domain_is_rejected() {
        let request = Request::post("/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"email":"someone@gmail.com","password":"secret123","first_name":"Ana","last_name":"Mora"}"#,
            ))
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_ids_are_rejected() {
        let request = Request::get("/sections/not-a-uuid").body(Body::empty()).unwrap();
        assert_eq!(status_of(request).await, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn deleting_referenced_catalog_rows_conflicts() {
        assert_eq!(
            deletion_response(Deletion::Deleted, "Question").unwrap(),
            StatusCode::NO_CONTENT
        );
        assert!(matches!(
            deletion_response(Deletion::Missing, "Question"),
            Err(AppError::NotFound(_))
        ));
        let refused = deletion_response(Deletion::InUse, "Questionnaire").unwrap_err();
        assert!(matches!(refused, AppError::Conflict(_)));
        assert_eq!(
            axum::response::IntoResponse::into_response(refused).status(),
            StatusCode::CONFLICT
        );
    }
}
