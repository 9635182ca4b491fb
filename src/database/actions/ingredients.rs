use potion::HtmlError;
use redis::aio::MultiplexedConnection;
use sqlx::{Pool, Postgres};

use crate::{
    authentication::permissions::ActionType,
    cache::catalog::{get_or, invalidate_catalog, CacheKey},
    error::{QueryError, TypeError},
    form::Form,
    jwt::SessionData,
    schema::{Ingredient, Uuid},
    INGREDIENT_NAME_MAX_LENGTH,
};

#[derive(Debug, Clone, PartialEq)]
pub struct IngredientForm {
    pub name: String,
    pub measurement_unit: String,
}

impl TryFrom<&Form> for IngredientForm {
    type Error = TypeError;

    fn try_from(form: &Form) -> Result<Self, Self::Error> {
        Ok(Self {
            name: form.get_str("name")?.trim().to_string(),
            measurement_unit: form.get_str("measurement_unit")?.trim().to_string(),
        })
    }
}

impl IngredientForm {
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.name.is_empty() || self.name.chars().count() > INGREDIENT_NAME_MAX_LENGTH {
            return Err(TypeError::new("Invalid ingredient name"));
        }
        if self.measurement_unit.is_empty()
            || self.measurement_unit.chars().count() > INGREDIENT_NAME_MAX_LENGTH
        {
            return Err(TypeError::new("Invalid measurement unit"));
        }
        Ok(())
    }
}

/// Escapes LIKE wildcards in `prefix` and appends `%`.
pub fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Ingredients whose name starts with `prefix`, case-insensitively, ordered by name.
pub async fn list_ingredients(
    prefix: &str,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, potion::Error> {
    let rows: Vec<Ingredient> = sqlx::query_as(
        "SELECT * FROM ingredients WHERE name ILIKE $1 ESCAPE '\\' ORDER BY name, id",
    )
    .bind(like_prefix(prefix))
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

pub async fn list_ingredients_cached(
    prefix: &str,
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Vec<Ingredient>, potion::Error> {
    match CacheKey::ingredients(prefix) {
        Some(key) => get_or(key, cache, || list_ingredients(prefix, pool)).await,
        None => list_ingredients(prefix, pool).await,
    }
}

pub async fn get_ingredient(
    id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Option<Ingredient>, potion::Error> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(row)
}

pub async fn get_ingredient_cached(
    id: Uuid,
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Option<Ingredient>, potion::Error> {
    get_or(CacheKey::Ingredient(id), cache, || get_ingredient(id, pool)).await
}

pub async fn create_ingredient(
    form: &IngredientForm,
    session: &SessionData,
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Ingredient, potion::Error> {
    session.authenticate(ActionType::ManageCatalog)?;
    form.validate().map_err(|e| e.into())?;

    let row: Option<Ingredient> = sqlx::query_as(
        "
        INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        RETURNING *
    ",
    )
    .bind(form.name.as_str())
    .bind(form.measurement_unit.as_str())
    .fetch_optional(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    let ingredient = match row {
        Some(ingredient) => ingredient,
        None => return Err(HtmlError::InvalidRequest.new("Ingredient already exists")),
    };

    invalidate_catalog(cache).await?;
    log::info!(
        "> Created ingredient {} ({})",
        ingredient.name,
        ingredient.id
    );

    Ok(ingredient)
}
