use warp::{
    reject::{self, Rejection},
    Filter,
};

use crate::constants::SESSION_COOKIE;

use super::jwt::{SessionData, SessionKeys};

#[derive(Debug)]
struct Unauthorized;

impl reject::Reject for Unauthorized {}

/// Resolves the session cookie, rejecting requests without a valid one.
pub fn with_session(
    keys: SessionKeys,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::cookie::<String>(SESSION_COOKIE).and_then(move |session: String| {
        let keys = keys.clone();
        async move {
            match keys.verify_session(&session) {
                Ok(data) => Ok(SessionData::from(data)),
                Err(_) => Err(warp::reject::custom(Unauthorized)),
            }
        }
    })
}

/// Like [`with_session`] but yields `None` for anonymous requests.
pub fn with_possible_session(
    keys: SessionKeys,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE).map(move |session: Option<String>| {
        session
            .and_then(|token| keys.verify_session(&token).ok())
            .map(SessionData::from)
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::{jwt::JwtSessionData, schema::UserRole};

    use super::*;

    fn keys() -> SessionKeys {
        SessionKeys::new(b"middleware-secret", 1).unwrap()
    }

    fn cookie(keys: &SessionKeys) -> String {
        let claims =
            JwtSessionData::new(3, String::from("baker"), UserRole::User, Duration::hours(1))
                .unwrap();
        format!("{SESSION_COOKIE}={}", keys.sign(&claims).ok().unwrap())
    }

    #[tokio::test]
    async fn possible_session_is_none_without_cookie() {
        let session = warp::test::request()
            .filter(&with_possible_session(keys()))
            .await
            .ok()
            .unwrap();

        assert!(session.is_none());
    }

    #[tokio::test]
    async fn possible_session_resolves_valid_cookie() {
        let keys = keys();
        let session = warp::test::request()
            .header("cookie", cookie(&keys))
            .filter(&with_possible_session(keys))
            .await
            .ok()
            .unwrap();

        assert_eq!(session.map(|s| s.user_id), Some(3));
    }

    #[tokio::test]
    async fn session_rejects_invalid_cookie() {
        let result = warp::test::request()
            .header("cookie", format!("{SESSION_COOKIE}=forged"))
            .filter(&with_session(keys()))
            .await;

        assert!(result.is_err());
    }
}
