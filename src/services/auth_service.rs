use chrono::{DateTime, Duration, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cancellation::commit;
use crate::auth::{
    generate_token, hash_password, hash_token, validate_password, verify_password_or_dummy,
    JwtKeys,
};
use crate::config::AuthConfig;
use crate::db::{self, credential_queries, user_queries};
use crate::errors::{is_unique_violation, AppError};
use crate::models::{
    AccessToken, AuthSession, LoginRequest, PasswordResetTicket, RefreshCredential,
    RegisterRequest, User,
};
use crate::services::notification_service::Mailer;

const TOKEN_TYPE: &str = "Bearer";

/// Signing keys plus token lifetimes; everything needed to mint credentials.
#[derive(Clone, Copy)]
pub struct SessionIssuer<'a> {
    pub keys: &'a JwtKeys,
    pub settings: &'a AuthConfig,
}

/// Access and refresh lifetimes for a login, longer with "remember me".
pub fn session_durations(settings: &AuthConfig, remember_me: bool) -> (Duration, Duration) {
    if remember_me {
        (
            Duration::minutes(settings.remember_me_access_minutes),
            Duration::days(settings.remember_me_refresh_days),
        )
    } else {
        (
            Duration::minutes(settings.access_token_minutes),
            Duration::days(settings.refresh_token_days),
        )
    }
}

/// Trims and lower-cases; requires exactly one `@` with something on both
/// sides.
pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    let mut parts = email.split('@');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        _ => false,
    };
    if !valid || email.len() > 254 {
        return Err(AppError::Validation(format!("Invalid email address: {}", raw.trim())));
    }
    Ok(email)
}

/// Argon2 is CPU-bound; keep it off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Blocking task failed: {}", e)))
}

/// New opaque refresh token and the credential row that stores its digest.
fn mint_refresh(
    settings: &AuthConfig,
    user_id: Uuid,
    remember_me: bool,
) -> (String, RefreshCredential) {
    let (_, refresh_ttl) = session_durations(settings, remember_me);
    let token = generate_token();
    let credential =
        RefreshCredential::new(user_id, hash_token(&token), Utc::now() + refresh_ttl, remember_me);
    (token, credential)
}

/// A refresh credential looked up by token digest is usable only while live.
pub fn accept_refresh(
    found: Option<RefreshCredential>,
    now: DateTime<Utc>,
) -> Result<RefreshCredential, AppError> {
    found
        .filter(|credential| credential.is_valid(now))
        .ok_or(AppError::InvalidRefresh)
}

pub fn accept_reset_ticket(
    found: Option<PasswordResetTicket>,
    now: DateTime<Utc>,
) -> Result<PasswordResetTicket, AppError> {
    found
        .filter(|ticket| ticket.is_valid(now))
        .ok_or(AppError::InvalidResetToken)
}

/// Access token for an accepted credential, with the lifetime of the login
/// that opened the session.
fn access_for(
    issuer: SessionIssuer<'_>,
    credential: &RefreshCredential,
) -> Result<AccessToken, AppError> {
    let (access_ttl, _) = session_durations(issuer.settings, credential.remember_me);
    let (access_token, _) = issuer.keys.issue(credential.user_id, access_ttl)?;
    Ok(AccessToken {
        access_token,
        token_type: TOKEN_TYPE,
        expires_in: access_ttl.num_seconds(),
    })
}

/// Logout must hit exactly one live credential.
fn require_revoked(rows: u64) -> Result<(), AppError> {
    if rows == 0 {
        return Err(AppError::NotFoundOrRevoked);
    }
    Ok(())
}

async fn open_session(
    conn: &mut PgConnection,
    issuer: SessionIssuer<'_>,
    user: User,
    remember_me: bool,
) -> Result<AuthSession, AppError> {
    let (access_ttl, _) = session_durations(issuer.settings, remember_me);
    let (refresh_token, credential) = mint_refresh(issuer.settings, user.id, remember_me);
    credential_queries::insert_refresh(&mut *conn, &credential).await?;

    let (access_token, _) = issuer.keys.issue(user.id, access_ttl)?;
    Ok(AuthSession {
        user,
        access_token,
        refresh_token,
        token_type: TOKEN_TYPE,
        expires_in: access_ttl.num_seconds(),
        refresh_expires_at: credential.expires_at,
    })
}

pub async fn register(
    pool: &PgPool,
    issuer: SessionIssuer<'_>,
    input: RegisterRequest,
) -> Result<AuthSession, AppError> {
    let email = normalize_email(&input.email)?;
    validate_password(&input.password)?;

    let password = input.password;
    let password_hash = blocking(move || hash_password(&password)).await??;

    let mut tx = pool.begin().await?;
    let user = match user_queries::insert(&mut *tx, &User::new(email, password_hash)).await {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => return Err(AppError::EmailTaken),
        Err(e) => {
            error!("Failed to insert user: {}", e);
            return Err(e.into());
        }
    };
    let session = open_session(&mut tx, issuer, user, input.remember_me).await?;
    commit(tx).await?;

    info!("✅ Registered user {}", session.user.id);
    Ok(session)
}

pub async fn login(
    pool: &PgPool,
    issuer: SessionIssuer<'_>,
    input: LoginRequest,
) -> Result<AuthSession, AppError> {
    // Malformed emails cannot belong to an account; same answer as a miss.
    let email = normalize_email(&input.email).map_err(|_| AppError::InvalidCredentials)?;
    let user = db::with_retry("find user by email", || user_queries::find_by_email(pool, &email))
        .await?;

    let password = input.password;
    let hash = user.as_ref().map(|u| u.password_hash.clone());
    let verified =
        blocking(move || verify_password_or_dummy(&password, hash.as_deref())).await?;

    let mut user = match (user, verified) {
        (Some(user), true) => user,
        _ => {
            warn!("Failed login attempt for {}", email);
            return Err(AppError::InvalidCredentials);
        }
    };

    let mut tx = pool.begin().await?;
    user_queries::touch_last_login(&mut *tx, user.id).await?;
    user.last_login_at = Some(Utc::now());
    let session = open_session(&mut tx, issuer, user, input.remember_me).await?;
    commit(tx).await?;

    info!("✅ User {} logged in", session.user.id);
    Ok(session)
}

/// Mints a new access token. The refresh credential is reused until it
/// expires or is revoked, and keeps the remember-me lifetime it was opened
/// with.
pub async fn refresh(
    pool: &PgPool,
    issuer: SessionIssuer<'_>,
    refresh_token: &str,
) -> Result<AccessToken, AppError> {
    let token_hash = hash_token(refresh_token);
    let found = db::with_retry("find refresh credential", || {
        credential_queries::find_refresh_by_hash(pool, &token_hash)
    })
    .await?;
    let credential = accept_refresh(found, Utc::now())?;
    access_for(issuer, &credential)
}

pub async fn logout(pool: &PgPool, refresh_token: &str) -> Result<(), AppError> {
    let revoked = credential_queries::revoke_by_hash(pool, &hash_token(refresh_token)).await?;
    require_revoked(revoked)
}

pub async fn logout_all(pool: &PgPool, user_id: Uuid) -> Result<u64, AppError> {
    let revoked = credential_queries::revoke_all_for_user(pool, user_id).await?;
    info!("Revoked {} refresh credentials for user {}", revoked, user_id);
    Ok(revoked)
}

/// Always succeeds for a well-formed email, whether or not an account
/// exists; the token only ever leaves through the mailer.
pub async fn initiate_password_reset(
    pool: &PgPool,
    mailer: &dyn Mailer,
    settings: &AuthConfig,
    email: &str,
) -> Result<(), AppError> {
    let email = normalize_email(email)?;
    let Some(user) =
        db::with_retry("find user by email", || user_queries::find_by_email(pool, &email)).await?
    else {
        info!("Password reset requested for unknown email");
        return Ok(());
    };

    let token = generate_token();
    let ticket = PasswordResetTicket::new(
        user.id,
        hash_token(&token),
        Utc::now() + Duration::minutes(settings.reset_token_minutes),
    );
    credential_queries::insert_reset_ticket(pool, &ticket).await?;

    // A delivery failure must look the same as success to the caller.
    if let Err(e) = mailer
        .send_password_reset(&user.email, &token, ticket.expires_at)
        .await
    {
        error!("❌ Failed to send password reset email to user {}: {}", user.id, e);
    }
    Ok(())
}

/// Sets the new password, consumes the ticket and revokes every refresh
/// credential of the user, all in one transaction.
pub async fn complete_password_reset(
    pool: &PgPool,
    token: &str,
    new_password: String,
) -> Result<(), AppError> {
    validate_password(&new_password)?;
    let token_hash = hash_token(token);
    let password_hash = blocking(move || hash_password(&new_password)).await??;

    let mut tx = pool.begin().await?;
    let found = credential_queries::lock_reset_ticket(&mut *tx, &token_hash).await?;
    let ticket = accept_reset_ticket(found, Utc::now())?;

    user_queries::update_password(&mut *tx, ticket.user_id, &password_hash).await?;
    credential_queries::mark_ticket_used(&mut *tx, ticket.id).await?;
    let revoked = credential_queries::revoke_all_for_user(&mut *tx, ticket.user_id).await?;
    commit(tx).await?;

    info!(
        "✅ Password reset for user {} ({} sessions revoked)",
        ticket.user_id, revoked
    );
    Ok(())
}

pub async fn current_user(pool: &PgPool, user_id: Uuid) -> Result<User, AppError> {
    db::with_retry("find user by id", || user_queries::find_by_id(pool, user_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
}

/// Counts of expired refresh credentials and reset tickets removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub refresh_credentials: u64,
    pub reset_tickets: u64,
}

pub async fn cleanup_expired_credentials(pool: &PgPool) -> Result<CleanupReport, AppError> {
    let refresh_credentials = db::with_retry("delete expired refresh credentials", || {
        credential_queries::delete_expired_refresh(pool)
    })
    .await?;
    let reset_tickets = db::with_retry("delete expired reset tickets", || {
        credential_queries::delete_expired_tickets(pool)
    })
    .await?;
    Ok(CleanupReport {
        refresh_credentials,
        reset_tickets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    /// In-memory stand-in for the refresh_credentials table, keyed by token
    /// digest and revoking only live rows like the queries do.
    #[derive(Default)]
    struct CredentialTable {
        rows: Vec<RefreshCredential>,
    }

    impl CredentialTable {
        fn login(&mut self, settings: &AuthConfig, user_id: Uuid, remember_me: bool) -> String {
            let (token, credential) = mint_refresh(settings, user_id, remember_me);
            self.rows.push(credential);
            token
        }

        fn find(&self, token: &str) -> Option<RefreshCredential> {
            let token_hash = hash_token(token);
            self.rows.iter().find(|c| c.token_hash == token_hash).cloned()
        }

        fn logout(&mut self, token: &str, now: DateTime<Utc>) -> Result<(), AppError> {
            let token_hash = hash_token(token);
            let mut revoked = 0;
            for credential in self.rows.iter_mut().filter(|c| c.token_hash == token_hash) {
                if credential.revoke(now) {
                    revoked += 1;
                }
            }
            require_revoked(revoked)
        }

        fn revoke_all(&mut self, user_id: Uuid, now: DateTime<Utc>) -> u64 {
            let mut revoked = 0;
            for credential in self.rows.iter_mut().filter(|c| c.user_id == user_id) {
                if credential.revoke(now) {
                    revoked += 1;
                }
            }
            revoked
        }
    }

    #[test]
    fn test_email_normalization() {
        assert_eq!(normalize_email("  Alice@Example.COM ").unwrap(), "alice@example.com");
        assert!(normalize_email("alice").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("alice@").is_err());
        assert!(normalize_email("a@b@c").is_err());
        assert!(normalize_email("al ice@example.com").is_err());
    }

    #[test]
    fn test_remember_me_extends_both_lifetimes() {
        let config = test_config();
        let (access, refresh) = session_durations(&config.auth, false);
        assert_eq!(access, Duration::minutes(30));
        assert_eq!(refresh, Duration::days(7));

        let (access, refresh) = session_durations(&config.auth, true);
        assert_eq!(access, Duration::minutes(120));
        assert_eq!(refresh, Duration::days(30));
    }

    #[test]
    fn test_refresh_logout_round_trip() {
        let config = test_config();
        let keys = JwtKeys::new(&config.auth.jwt_secret);
        let issuer = SessionIssuer {
            keys: &keys,
            settings: &config.auth,
        };
        let user_id = Uuid::new_v4();
        let mut table = CredentialTable::default();
        let token = table.login(&config.auth, user_id, false);
        let now = Utc::now();

        let credential = accept_refresh(table.find(&token), now).unwrap();
        let access = access_for(issuer, &credential).unwrap();
        assert_eq!(keys.verify(&access.access_token).unwrap().sub, user_id);
        assert_eq!(access.expires_in, Duration::minutes(30).num_seconds());

        // The same refresh token keeps working until logout.
        assert!(accept_refresh(table.find(&token), now).is_ok());

        table.logout(&token, now).unwrap();
        assert!(matches!(
            accept_refresh(table.find(&token), now),
            Err(AppError::InvalidRefresh)
        ));
        assert!(matches!(table.logout(&token, now), Err(AppError::NotFoundOrRevoked)));
        assert!(matches!(
            accept_refresh(table.find("never-issued"), now),
            Err(AppError::InvalidRefresh)
        ));
    }

    #[test]
    fn test_refresh_keeps_remember_me_lifetime() {
        let config = test_config();
        let keys = JwtKeys::new(&config.auth.jwt_secret);
        let issuer = SessionIssuer {
            keys: &keys,
            settings: &config.auth,
        };
        let mut table = CredentialTable::default();
        let token = table.login(&config.auth, Uuid::new_v4(), true);

        let credential = accept_refresh(table.find(&token), Utc::now()).unwrap();
        assert!(credential.remember_me);
        assert!(credential.expires_at > Utc::now() + Duration::days(29));

        let access = access_for(issuer, &credential).unwrap();
        assert_eq!(access.expires_in, Duration::minutes(120).num_seconds());
    }

    #[test]
    fn test_expired_refresh_is_rejected() {
        let config = test_config();
        let mut table = CredentialTable::default();
        let token = table.login(&config.auth, Uuid::new_v4(), false);
        let later = Utc::now() + Duration::days(8);
        assert!(matches!(
            accept_refresh(table.find(&token), later),
            Err(AppError::InvalidRefresh)
        ));
    }

    #[test]
    fn test_password_reset_revokes_every_session() {
        let config = test_config();
        let user_id = Uuid::new_v4();
        let other_user = Uuid::new_v4();
        let mut table = CredentialTable::default();
        let laptop = table.login(&config.auth, user_id, false);
        let phone = table.login(&config.auth, user_id, true);
        let bystander = table.login(&config.auth, other_user, false);
        let now = Utc::now();

        let issued = PasswordResetTicket::new(user_id, hash_token("reset"), now + Duration::hours(1));
        let mut ticket = accept_reset_ticket(Some(issued), now).unwrap();
        assert_eq!(table.revoke_all(ticket.user_id, now), 2);
        ticket.used_at = Some(now);

        for token in [&laptop, &phone] {
            assert!(matches!(
                accept_refresh(table.find(token), now),
                Err(AppError::InvalidRefresh)
            ));
        }
        assert!(accept_refresh(table.find(&bystander), now).is_ok());

        // Single use: the consumed ticket no longer resets anything.
        assert!(matches!(
            accept_reset_ticket(Some(ticket), now),
            Err(AppError::InvalidResetToken)
        ));
        assert!(matches!(
            accept_reset_ticket(None, now),
            Err(AppError::InvalidResetToken)
        ));
    }

    #[tokio::test]
    async fn test_blocking_runs_closure() {
        let value = blocking(|| 2 + 2).await.unwrap();
        assert_eq!(value, 4);
    }
}
