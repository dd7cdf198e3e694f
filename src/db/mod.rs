pub mod catalog;
pub mod evaluations;
pub mod reports;
pub mod seed;

use crate::domain::models::UserRole;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub email: String,
    pub hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub career: Option<String>,
    pub course: Option<String>,
    pub parallel: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User as exposed over the API; never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub career: Option<String>,
    pub course: Option<String>,
    pub parallel: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DbUser> for PublicUser {
    fn from(user: DbUser) -> Self {
        PublicUser {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            career: user.career,
            course: user.course,
            parallel: user.parallel,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

pub struct NewUser<'a> {
    pub email: &'a str,
    pub hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub role: UserRole,
    pub career: Option<&'a str>,
    pub course: Option<&'a str>,
    pub parallel: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<UserRole>,
    pub career: Option<String>,
    pub course: Option<String>,
    pub parallel: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE email = $1")
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Returns `None` when the email is already registered.
pub async fn insert_user(pool: &PgPool, user: &NewUser<'_>) -> Result<Option<DbUser>> {
    let created = sqlx::query_as::<_, DbUser>(
        r#"
        INSERT INTO users (id, email, hash, first_name, last_name, role, career, course, parallel)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (email) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.email.trim().to_lowercase())
    .bind(user.hash)
    .bind(user.first_name.trim())
    .bind(user.last_name.trim())
    .bind(user.role)
    .bind(user.career.map(str::trim))
    .bind(user.course.map(str::trim))
    .bind(user.parallel.map(str::trim))
    .fetch_optional(pool)
    .await?;
    Ok(created)
}

pub async fn get_all_users(pool: &PgPool) -> Result<Vec<DbUser>> {
    let users = sqlx::query_as::<_, DbUser>("SELECT * FROM users ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;
    Ok(users)
}

/// Active students, optionally narrowed to a career and course.
pub async fn get_active_students(
    pool: &PgPool,
    career: Option<&str>,
    course: Option<&str>,
) -> Result<Vec<DbUser>> {
    let users = sqlx::query_as::<_, DbUser>(
        r#"
        SELECT *
        FROM users
        WHERE role = 'student'
          AND is_active = true
          AND ($1::text IS NULL OR career = $1)
          AND ($2::text IS NULL OR course = $2)
        ORDER BY last_name, first_name
        "#,
    )
    .bind(career)
    .bind(course)
    .fetch_all(pool)
    .await?;
    Ok(users)
}

pub async fn count_active_students(pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE role = 'student' AND is_active = true",
    )
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn update_user(pool: &PgPool, id: Uuid, changes: &UserChanges) -> Result<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(
        r#"
        UPDATE users
        SET first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            role = COALESCE($4, role),
            career = COALESCE($5, career),
            course = COALESCE($6, course),
            parallel = COALESCE($7, parallel),
            is_active = COALESCE($8, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(changes.first_name.as_deref())
    .bind(changes.last_name.as_deref())
    .bind(changes.role)
    .bind(changes.career.as_deref())
    .bind(changes.course.as_deref())
    .bind(changes.parallel.as_deref())
    .bind(changes.is_active)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn delete_user(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
