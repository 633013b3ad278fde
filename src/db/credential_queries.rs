use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{PasswordResetTicket, RefreshCredential};

pub async fn insert_refresh<'e, E: PgExecutor<'e>>(
    executor: E,
    credential: &RefreshCredential,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO refresh_credentials (id, user_id, token_hash, expires_at, remember_me, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(credential.id)
    .bind(credential.user_id)
    .bind(&credential.token_hash)
    .bind(credential.expires_at)
    .bind(credential.remember_me)
    .bind(credential.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find_refresh_by_hash<'e, E: PgExecutor<'e>>(
    executor: E,
    token_hash: &str,
) -> Result<Option<RefreshCredential>, sqlx::Error> {
    sqlx::query_as::<_, RefreshCredential>(
        "SELECT id, user_id, token_hash, expires_at, revoked_at, remember_me, created_at
         FROM refresh_credentials
         WHERE token_hash = $1",
    )
    .bind(token_hash)
    .fetch_optional(executor)
    .await
}

/// Revokes one live credential. Zero rows means unknown or already revoked.
pub async fn revoke_by_hash<'e, E: PgExecutor<'e>>(
    executor: E,
    token_hash: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE refresh_credentials SET revoked_at = NOW()
         WHERE token_hash = $1 AND revoked_at IS NULL",
    )
    .bind(token_hash)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn revoke_all_for_user<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE refresh_credentials SET revoked_at = NOW()
         WHERE user_id = $1 AND revoked_at IS NULL",
    )
    .bind(user_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn insert_reset_ticket<'e, E: PgExecutor<'e>>(
    executor: E,
    ticket: &PasswordResetTicket,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO password_reset_tickets (id, user_id, token_hash, expires_at, created_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(ticket.id)
    .bind(ticket.user_id)
    .bind(&ticket.token_hash)
    .bind(ticket.expires_at)
    .bind(ticket.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Locks the ticket so two concurrent completions cannot both use it.
pub async fn lock_reset_ticket<'e, E: PgExecutor<'e>>(
    executor: E,
    token_hash: &str,
) -> Result<Option<PasswordResetTicket>, sqlx::Error> {
    sqlx::query_as::<_, PasswordResetTicket>(
        "SELECT id, user_id, token_hash, expires_at, used_at, created_at
         FROM password_reset_tickets
         WHERE token_hash = $1
         FOR UPDATE",
    )
    .bind(token_hash)
    .fetch_optional(executor)
    .await
}

pub async fn mark_ticket_used<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE password_reset_tickets SET used_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete_expired_refresh<'e, E: PgExecutor<'e>>(
    executor: E,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM refresh_credentials WHERE expires_at < NOW()")
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_expired_tickets<'e, E: PgExecutor<'e>>(
    executor: E,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM password_reset_tickets WHERE expires_at < NOW()")
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
