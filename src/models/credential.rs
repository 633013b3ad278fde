use serde::Serialize;
use sqlx::FromRow;

// Long-lived session handle. Only the SHA-256 digest of the token is stored.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RefreshCredential {
    pub id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub revoked_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Login option the session was opened with; refreshes keep its lifetimes.
    pub remember_me: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl RefreshCredential {
    pub(crate) fn new(
        user_id: uuid::Uuid,
        token_hash: String,
        expires_at: chrono::DateTime<chrono::Utc>,
        remember_me: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            user_id,
            token_hash,
            expires_at,
            revoked_at: None,
            remember_me,
            created_at: chrono::Utc::now(),
        }
    }

    /// Valid iff never revoked and not yet expired.
    pub fn is_valid(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }

    /// Returns false when the credential was already revoked; the first
    /// revocation time is kept.
    pub fn revoke(&mut self, now: chrono::DateTime<chrono::Utc>) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        self.revoked_at = Some(now);
        true
    }
}

// Single-use password reset grant.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetTicket {
    pub id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub token_hash: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub used_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl PasswordResetTicket {
    pub(crate) fn new(
        user_id: uuid::Uuid,
        token_hash: String,
        expires_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            user_id,
            token_hash,
            expires_at,
            used_at: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn is_valid(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_refresh_credential_validity() {
        let now = Utc::now();
        let mut credential =
            RefreshCredential::new(uuid::Uuid::new_v4(), "hash".into(), now + Duration::days(7), false);
        assert!(credential.is_valid(now));

        credential.revoked_at = Some(now);
        assert!(!credential.is_valid(now));

        let expired =
            RefreshCredential::new(uuid::Uuid::new_v4(), "hash".into(), now - Duration::seconds(1), false);
        assert!(!expired.is_valid(now));
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let credential = RefreshCredential::new(uuid::Uuid::new_v4(), "hash".into(), now, false);
        assert!(!credential.is_valid(now));
    }

    #[test]
    fn test_second_revocation_is_refused() {
        let now = Utc::now();
        let mut credential =
            RefreshCredential::new(uuid::Uuid::new_v4(), "hash".into(), now + Duration::days(7), true);
        assert!(credential.revoke(now));
        assert!(!credential.revoke(now + Duration::minutes(5)));
        assert_eq!(credential.revoked_at, Some(now));
    }

    #[test]
    fn test_reset_ticket_is_single_use() {
        let now = Utc::now();
        let mut ticket =
            PasswordResetTicket::new(uuid::Uuid::new_v4(), "hash".into(), now + Duration::hours(1));
        assert!(ticket.is_valid(now));

        ticket.used_at = Some(now);
        assert!(!ticket.is_valid(now));
    }
}
