use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use potion::HtmlError;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::{error::ConfigError, schema::User};
use crate::schema::{UserRole, Uuid};

use super::permissions::ActionType;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JwtSessionData {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    /// `None` when `lifetime` pushes the expiry past the representable range.
    pub fn new(id: Uuid, username: String, role: UserRole, lifetime: Duration) -> Option<Self> {
        let now = Local::now();
        let exp = now.checked_add_signed(lifetime)?;

        Some(Self {
            user_id: id,
            username,
            role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        })
    }

    pub fn is_expired(&self, now: i64) -> bool {
        (self.exp - now).is_negative()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionData {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub is_admin: bool,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), potion::Error> {
        if !action.authenticate(self) {
            return Err(
                HtmlError::Unauthorized.new("You don't have permission to perform this action")
            );
        }
        Ok(())
    }

    /// Owners may always act on their own rows; `action` grants access to everyone else's.
    pub fn authenticate_owner(
        &self,
        owner_id: Uuid,
        action: ActionType,
    ) -> Result<(), potion::Error> {
        if owner_id == self.user_id {
            return Ok(());
        }
        self.authenticate(action)
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            username: value.username,
            user_id: value.user_id,
            is_admin: value.role == UserRole::Admin,
            role: value.role,
        }
    }
}

/// Signing key and token lifetime for session cookies.
#[derive(Clone)]
pub struct SessionKeys {
    key: Hmac<Sha256>,
    lifetime: Duration,
}

impl SessionKeys {
    pub fn new(secret: &[u8], lifetime_hours: i64) -> Result<Self, ConfigError> {
        let lifetime = Duration::try_hours(lifetime_hours)
            .filter(|lifetime| *lifetime > Duration::zero())
            .ok_or_else(|| ConfigError::Invalid {
                key: "SESSION_LIFETIME_HOURS",
                value: lifetime_hours.to_string(),
            })?;

        let key = Hmac::new_from_slice(secret).map_err(|_| ConfigError::Invalid {
            key: "JWT_SECRET",
            value: String::from("<redacted>"),
        })?;

        Ok(Self { key, lifetime })
    }

    pub fn generate_session(&self, user: &User) -> Result<String, potion::Error> {
        let claims = JwtSessionData::new(
            user.id,
            user.username.to_owned(),
            user.role.to_owned(),
            self.lifetime,
        )
        .ok_or_else(|| HtmlError::InternalServerError.new("Session lifetime out of range"))?;

        self.sign(&claims)
    }

    pub fn sign(&self, claims: &JwtSessionData) -> Result<String, potion::Error> {
        claims
            .sign_with_key(&self.key)
            .map_err(|_| HtmlError::InternalServerError.new("Failed to sign session"))
    }

    pub fn verify_session(&self, token: &str) -> Result<JwtSessionData, potion::Error> {
        let session: JwtSessionData = token
            .verify_with_key(&self.key)
            .map_err(|_| HtmlError::InvalidSession.new("Invalid Session; Invalid token"))?;

        if session.is_expired(Local::now().timestamp()) {
            return Err(HtmlError::InvalidSession.new("Invalid session; Token expired"));
        }

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(secret: &[u8]) -> SessionKeys {
        SessionKeys::new(secret, 1).unwrap()
    }

    fn claims() -> JwtSessionData {
        JwtSessionData::new(7, String::from("cook"), UserRole::User, Duration::hours(1)).unwrap()
    }

    #[test]
    fn signed_session_verifies() {
        let keys = keys(b"test-secret");
        let token = keys.sign(&claims()).ok().unwrap();

        let session = keys.verify_session(&token).ok().unwrap();
        assert_eq!(session.user_id, 7);
        assert_eq!(session.username, "cook");
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let token = keys(b"one").sign(&claims()).ok().unwrap();

        assert!(keys(b"two").verify_session(&token).is_err());
        assert!(keys(b"one").verify_session("garbage").is_err());
    }

    #[test]
    fn expired_session_is_rejected() {
        let keys = keys(b"test-secret");
        let mut expired = claims();
        expired.iat -= 7200;
        expired.exp -= 7200;

        let token = keys.sign(&expired).ok().unwrap();
        assert!(keys.verify_session(&token).is_err());
    }

    #[test]
    fn lifetime_must_be_positive_and_representable() {
        assert!(SessionKeys::new(b"secret", 0).is_err());
        assert!(SessionKeys::new(b"secret", -5).is_err());
        assert_eq!(
            SessionKeys::new(b"secret", i64::MAX).err(),
            Some(ConfigError::Invalid {
                key: "SESSION_LIFETIME_HOURS",
                value: i64::MAX.to_string(),
            })
        );
    }

    #[test]
    fn unrepresentable_expiry_is_not_a_panic() {
        let far = Duration::try_hours(1_000_000_000_000).unwrap();

        assert!(JwtSessionData::new(7, String::from("cook"), UserRole::User, far).is_none());
    }

    #[test]
    fn admin_flag_follows_role() {
        let mut data = claims();
        data.role = UserRole::Admin;

        let session: SessionData = data.into();
        assert!(session.is_admin);
    }
}
