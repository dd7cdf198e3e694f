use crate::db::{self, catalog, evaluations, NewUser};
use crate::domain::levels::LevelRanges;
use crate::domain::models::{SectionName, UserRole};
use anyhow::Result;
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use sqlx::PgPool;

struct SeedUser<'a> {
    local_part: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    role: UserRole,
    career: Option<&'a str>,
    course: Option<&'a str>,
    parallel: Option<&'a str>,
}

const SAMPLE_CAREER: &str = "Ingeniería en Sistemas";

/// Idempotent: every insert skips rows that already exist. Seeded accounts
/// live under `email_domain` so they pass the same check as registrations.
pub async fn seed_all(pool: &PgPool, password: &str, email_domain: &str) -> Result<()> {
    seed_users(pool, password, email_domain).await?;
    seed_careers(pool).await?;
    seed_sections(pool).await?;
    Ok(())
}

async fn seed_users(pool: &PgPool, password: &str, email_domain: &str) -> Result<()> {
    let users = [
        SeedUser {
            local_part: "admin",
            first_name: "Administrador",
            last_name: "Sistema",
            role: UserRole::Admin,
            career: None,
            course: None,
            parallel: None,
        },
        SeedUser {
            local_part: "estudiante",
            first_name: "Estudiante",
            last_name: "Prueba",
            role: UserRole::Student,
            career: Some(SAMPLE_CAREER),
            course: Some("8vo"),
            parallel: Some("A"),
        },
    ];

    let argon = Argon2::default();
    for user in users {
        let email = seed_email(user.local_part, email_domain);
        let salt = SaltString::generate(rand_core::OsRng);
        let hash = argon
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        let created = db::insert_user(
            pool,
            &NewUser {
                email: &email,
                hash: &hash,
                first_name: user.first_name,
                last_name: user.last_name,
                role: user.role,
                career: user.career,
                course: user.course,
                parallel: user.parallel,
            },
        )
        .await?;
        if created.is_some() {
            tracing::info!("Seeded {} user {}", user.role.as_str(), email);
        }
    }
    Ok(())
}

fn seed_email(local_part: &str, email_domain: &str) -> String {
    format!("{local_part}@{email_domain}")
}

async fn seed_careers(pool: &PgPool) -> Result<()> {
    catalog::insert_career(pool, SAMPLE_CAREER, None, true).await?;
    Ok(())
}

async fn seed_sections(pool: &PgPool) -> Result<()> {
    for name in [
        SectionName::Blandas,
        SectionName::Adaptativas,
        SectionName::Tecnologicas,
    ] {
        catalog::insert_section(pool, name, name.default_display_name(), None).await?;
        let section = catalog::find_section_by_name(pool, name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("section {:?} missing after seeding", name))?;
        evaluations::insert_config(pool, section.id, &LevelRanges::DEFAULT).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn seed_accounts_follow_the_configured_domain() {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/db".to_string()),
            "SESSION_KEY" => Some("Kioqkioqkioqkioqkioqkioqkioqkioqkioqkioqkio=".to_string()),
            "ALLOWED_EMAIL_DOMAIN" => Some("@Uni.Example.org".to_string()),
            _ => None,
        })
        .unwrap();

        let email = seed_email("admin", &config.allowed_email_domain);
        assert_eq!(email, "admin@uni.example.org");
        assert!(config.email_allowed(&email));
    }
}
