use std::fmt::{self, Display};

use potion::{Error, HtmlError};
use warp::reject::Rejection;

pub struct QueryError {
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Configuration(e) => Self::new(format!("{e}")),
            sqlx::Error::Database(e) => Self::new(format!("{e}")),
            sqlx::Error::Io(e) => Self::new(format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(format!("{e}")),
            sqlx::Error::RowNotFound => Self::new(String::from("RowNotFound")),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::new(format!("Column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("{e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(String::from("Worker crashed")),
            _ => Self::new(String::from("Unknown error")),
        }
    }
}

impl Into<Error> for QueryError {
    fn into(self) -> Error {
        Error {
            code: 500,
            info: Some(self.info),
            redirect: None,
        }
    }
}

pub struct CacheError {
    info: String,
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(value: serde_json::Error) -> Self {
        Self {
            info: format!("Cached payload is not valid JSON: {value}"),
        }
    }
}

impl Into<Error> for CacheError {
    fn into(self) -> Error {
        Error {
            code: 500,
            info: Some(self.info),
            redirect: None,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct TypeError {
    info: String,
}

impl TypeError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }

    pub fn info(&self) -> &str {
        &self.info
    }
}

impl Into<potion::Error> for TypeError {
    fn into(self) -> potion::Error {
        HtmlError::InvalidRequest.new(&self.info)
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for TypeError {}

impl Into<Rejection> for TypeError {
    fn into(self) -> Rejection {
        HtmlError::InvalidRequest.new(&self.info).into()
    }
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "Environment variable {key} is not set"),
            ConfigError::Invalid { key, value } => {
                write!(f, "Environment variable {key} has an invalid value: {value}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failures of the shopping list download. Store failures are carried as-is.
pub enum ShoppingListError {
    Unauthenticated,
    EmptyCart,
    Store(potion::Error),
}

impl From<potion::Error> for ShoppingListError {
    fn from(value: potion::Error) -> Self {
        Self::Store(value)
    }
}

impl fmt::Debug for ShoppingListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShoppingListError::Unauthenticated => write!(f, "Unauthenticated"),
            ShoppingListError::EmptyCart => write!(f, "EmptyCart"),
            ShoppingListError::Store(e) => write!(f, "Store({:?})", e.info),
        }
    }
}

impl Display for ShoppingListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShoppingListError::Unauthenticated => write!(f, "Authentication required"),
            ShoppingListError::EmptyCart => {
                write!(f, "Shopping cart is empty, nothing to download")
            }
            ShoppingListError::Store(e) => {
                write!(f, "{}", e.info.as_deref().unwrap_or("Store failure"))
            }
        }
    }
}

impl Into<potion::Error> for ShoppingListError {
    fn into(self) -> potion::Error {
        match self {
            ShoppingListError::Unauthenticated => {
                HtmlError::Unauthorized.new("Authentication required")
            }
            ShoppingListError::EmptyCart => {
                HtmlError::InvalidRequest.new("Shopping cart is empty, nothing to download")
            }
            ShoppingListError::Store(e) => e,
        }
    }
}

impl Into<Rejection> for ShoppingListError {
    fn into(self) -> Rejection {
        let error: potion::Error = self.into();
        error.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shopping_list_error_messages() {
        assert_eq!(
            ShoppingListError::EmptyCart.to_string(),
            "Shopping cart is empty, nothing to download"
        );
        assert_eq!(
            ShoppingListError::Unauthenticated.to_string(),
            "Authentication required"
        );
        assert_eq!(format!("{:?}", ShoppingListError::EmptyCart), "EmptyCart");
    }

    #[test]
    fn shopping_list_errors_map_to_html_errors() {
        let unauthorized = HtmlError::Unauthorized.new("Authentication required");
        let error: potion::Error = ShoppingListError::Unauthenticated.into();
        assert_eq!(error.code, unauthorized.code);
        assert_eq!(error.info.as_deref(), Some("Authentication required"));

        let invalid = HtmlError::InvalidRequest.new("Shopping cart is empty, nothing to download");
        let error: potion::Error = ShoppingListError::EmptyCart.into();
        assert_eq!(error.code, invalid.code);
        assert_ne!(error.code, unauthorized.code);
        assert_eq!(
            error.info.as_deref(),
            Some("Shopping cart is empty, nothing to download")
        );
    }

    #[test]
    fn store_errors_keep_their_info() {
        let error: potion::Error = QueryError::new(String::from("Pool closed")).into();
        let wrapped = ShoppingListError::from(error);

        assert_eq!(wrapped.to_string(), "Pool closed");
        let error: potion::Error = wrapped.into();
        assert_eq!(error.code, 500);
        assert_eq!(error.info.as_deref(), Some("Pool closed"));
    }

    #[test]
    fn config_error_names_the_key() {
        let error = ConfigError::Invalid {
            key: "SESSION_LIFETIME_HOURS",
            value: String::from("soon"),
        };
        assert_eq!(
            error.to_string(),
            "Environment variable SESSION_LIFETIME_HOURS has an invalid value: soon"
        );
    }
}
