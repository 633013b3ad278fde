use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::User;

const USER_COLUMNS: &str = "id, email, password_hash, created_at, updated_at, last_login_at";

pub async fn insert<'e, E: PgExecutor<'e>>(executor: E, user: &User) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (id, email, password_hash, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {}",
        USER_COLUMNS
    ))
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.created_at)
    .bind(user.updated_at)
    .fetch_one(executor)
    .await
}

pub async fn find_by_email<'e, E: PgExecutor<'e>>(
    executor: E,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
        .bind(email)
        .fetch_optional(executor)
        .await
}

pub async fn find_by_id<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn touch_last_login<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn update_password<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    password_hash: &str,
) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(executor)
            .await?;
    Ok(result.rows_affected())
}
