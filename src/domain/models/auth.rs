use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Provider id used for email/password credentials on the `account` table
pub const CREDENTIAL_PROVIDER: &str = "credential";

/// A registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A login session, addressed by its random token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A credential or linked provider account belonging to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub account_id: String,
    pub provider_id: String,
    pub user_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    /// Argon2 PHC string; never leaves the server
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A pending verification (email confirmation and similar one-shot tokens)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub id: String,
    pub identifier: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session lifetime and sliding-renewal cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Lifetime granted on creation and on every renewal
    pub expires_in: Duration,
    /// Minimum time between two renewals of the same session
    pub update_age: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            expires_in: Duration::days(7),
            update_age: Duration::days(1),
        }
    }
}

impl SessionPolicy {
    /// Whether a session last renewed `expires_in` before its expiry is due again
    pub fn needs_renewal(&self, session: &Session, now: DateTime<Utc>) -> bool {
        session.expires_at - self.expires_in + self.update_age <= now
    }

    pub fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.expires_in
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_expiring_at(expires_at: DateTime<Utc>) -> Session {
        Session {
            id: "s1".into(),
            user_id: "u1".into(),
            token: "t".into(),
            expires_at,
            ip_address: None,
            user_agent: None,
            created_at: expires_at - Duration::days(7),
            updated_at: expires_at - Duration::days(7),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = SessionPolicy::default();
        assert_eq!(policy.expires_in, Duration::days(7));
        assert_eq!(policy.update_age, Duration::days(1));
    }

    #[test]
    fn test_renewal_cadence() {
        let policy = SessionPolicy::default();
        let created = Utc::now();
        let session = session_expiring_at(policy.expiry_from(created));

        assert!(!policy.needs_renewal(&session, created));
        assert!(!policy.needs_renewal(&session, created + Duration::hours(23)));
        assert!(policy.needs_renewal(&session, created + Duration::days(1)));
        assert!(policy.needs_renewal(&session, created + Duration::days(3)));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let session = session_expiring_at(now);
        assert!(session.is_expired(now));
        assert!(!session.is_expired(now - Duration::seconds(1)));
    }
}
