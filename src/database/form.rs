use std::{collections::HashMap, str::FromStr};

use serde_json::Value;

use super::error::TypeError;

/// Loosely typed request body, read field by field.
pub struct Form {
    inner: HashMap<String, Value>,
}

impl Form {
    pub fn from_value(value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Object(map) => Ok(Self {
                inner: map.into_iter().collect(),
            }),
            _ => Err(TypeError::new("Expected an object")),
        }
    }

    /// Accepts both JSON numbers and numeric strings.
    pub fn get_number<T>(&self, key: &str) -> Result<T, TypeError>
    where
        T: FromStr,
    {
        match self.inner.get(key) {
            Some(value) => parse_number(value)
                .ok_or_else(|| TypeError::new(&format!("Invalid number for {key}"))),
            None => Err(TypeError::new(&format!("Missing field {key}"))),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<String, TypeError> {
        match self.inner.get(key) {
            Some(value) => match value.as_str() {
                Some(v) => Ok(v.to_string()),
                None => Err(TypeError::new(&format!("Expected a string for {key}"))),
            },
            None => Err(TypeError::new(&format!("Missing field {key}"))),
        }
    }

    pub fn get_list(&self, key: &str) -> Result<Vec<Value>, TypeError> {
        match self.inner.get(key) {
            Some(Value::Array(items)) => Ok(items.to_owned()),
            Some(_) => Err(TypeError::new(&format!("Expected a list for {key}"))),
            None => Err(TypeError::new(&format!("Missing field {key}"))),
        }
    }
}

pub fn parse_number<T: FromStr>(value: &Value) -> Option<T> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
