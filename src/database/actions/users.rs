use std::sync::LazyLock;

use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::{SessionData, SessionKeys},
        permissions::ActionType,
    },
    error::{QueryError, TypeError},
    form::Form,
    schema::{User, UserProfile, Uuid},
    USER_COUNT_PER_PAGE,
};

use potion::HtmlError;
use regex::Regex;
use sqlx::{Pool, Postgres};

use super::is_subscribed;

const USERNAME_MAX_LENGTH: usize = 150;
const NAME_MAX_LENGTH: usize = 150;
const EMAIL_MAX_LENGTH: usize = 254;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern")
});

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationForm {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl TryFrom<&Form> for RegistrationForm {
    type Error = TypeError;

    fn try_from(form: &Form) -> Result<Self, Self::Error> {
        Ok(Self {
            email: form.get_str("email")?.trim().to_lowercase(),
            username: form.get_str("username")?.trim().to_string(),
            first_name: form.get_str("first_name").unwrap_or_default(),
            last_name: form.get_str("last_name").unwrap_or_default(),
            password: form.get_str("password")?,
        })
    }
}

impl RegistrationForm {
    pub fn validate(&self) -> Result<(), TypeError> {
        if !EMAIL.is_match(&self.email) || self.email.len() > EMAIL_MAX_LENGTH {
            return Err(TypeError::new("Invalid email"));
        }

        if self.username.is_empty()
            || self.username.chars().count() > USERNAME_MAX_LENGTH
            || !self
                .username
                .chars()
                .all(|c| c.is_alphanumeric() || "_.@+-".contains(c))
        {
            return Err(TypeError::new("Invalid username"));
        }

        if self.username.eq_ignore_ascii_case("me") {
            return Err(TypeError::new("Username is reserved"));
        }

        if self.first_name.chars().count() > NAME_MAX_LENGTH
            || self.last_name.chars().count() > NAME_MAX_LENGTH
        {
            return Err(TypeError::new("Name is too long"));
        }

        if self.password.is_empty() {
            return Err(TypeError::new("Password is required"));
        }

        Ok(())
    }
}

pub async fn get_user_by_email(
    pool: &Pool<Postgres>,
    email: &str,
) -> Result<Option<User>, potion::Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(row)
}

pub async fn get_user_by_id(
    pool: &Pool<Postgres>,
    user_id: Uuid,
) -> Result<Option<User>, potion::Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(row)
}

pub async fn get_user_profile(
    pool: &Pool<Postgres>,
    user_id: Uuid,
    viewer: Option<&SessionData>,
) -> Result<Option<UserProfile>, potion::Error> {
    let user = match get_user_by_id(pool, user_id).await? {
        Some(user) => user,
        None => return Ok(None),
    };

    let followed = match viewer {
        Some(session) => is_subscribed(session.user_id, user.id, pool).await?,
        None => false,
    };

    Ok(Some(UserProfile::from_user(user, followed)))
}

/// Full user rows, emails included, so only for `ManageUsers`.
pub async fn list_users(
    session: &SessionData,
    limit: Option<i64>,
    offset: i64,
    pool: &Pool<Postgres>,
) -> Result<Vec<User>, potion::Error> {
    session.authenticate(ActionType::ManageUsers)?;

    let limit = limit.unwrap_or(USER_COUNT_PER_PAGE);
    let rows: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY id LIMIT $1 OFFSET $2")
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

/// Creates a user; returns `false` when the username or email is taken.
pub async fn register_user(
    form: &RegistrationForm,
    pool: &Pool<Postgres>,
) -> Result<bool, potion::Error> {
    form.validate().map_err(|e| e.into())?;

    let password = hash_password(&form.password)
        .map_err(|_| HtmlError::InternalServerError.new("Failed to hash password"))?;

    let query = sqlx::query(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING;
    ",
    )
    .bind(form.email.as_str())
    .bind(form.username.as_str())
    .bind(form.first_name.as_str())
    .bind(form.last_name.as_str())
    .bind(password)
    .execute(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(query.rows_affected() > 0)
}

/// Verifies credentials and returns a signed session token.
pub async fn login_user(
    email: &str,
    password: &str,
    keys: &SessionKeys,
    pool: &Pool<Postgres>,
) -> Result<String, potion::Error> {
    let user = match get_user_by_email(pool, email).await? {
        Some(user) => user,
        None => return Err(HtmlError::InvalidRequest.new("Invalid credentials")),
    };

    let authenticated = verify_password(password, &user.password)
        .map_err(|_| HtmlError::InternalServerError.new("Stored password hash is malformed"))?;
    if !authenticated {
        return Err(HtmlError::InvalidRequest.new("Invalid credentials"));
    }

    keys.generate_session(&user)
}

pub async fn set_password(
    current_password: &str,
    new_password: &str,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    if new_password.is_empty() {
        return Err(HtmlError::InvalidRequest.new("Password is required"));
    }

    let user = match get_user_by_id(pool, session.user_id).await? {
        Some(user) => user,
        None => return Err(HtmlError::InvalidRequest.new("User doesn't exist")),
    };

    let authenticated = verify_password(current_password, &user.password)
        .map_err(|_| HtmlError::InternalServerError.new("Stored password hash is malformed"))?;
    if !authenticated {
        return Err(HtmlError::InvalidRequest.new("Invalid credentials"));
    }

    let password = hash_password(new_password)
        .map_err(|_| HtmlError::InternalServerError.new("Failed to hash password"))?;

    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(password)
        .bind(user.id)
        .execute(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(())
}
