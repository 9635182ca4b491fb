use std::sync::LazyLock;

use potion::HtmlError;
use regex::Regex;
use redis::aio::MultiplexedConnection;
use sqlx::{Pool, Postgres};

use crate::{
    authentication::permissions::ActionType,
    cache::catalog::{get_or, invalidate_catalog, CacheKey},
    error::{QueryError, TypeError},
    form::Form,
    jwt::SessionData,
    schema::{Tag, Uuid},
    TAG_NAME_MAX_LENGTH, TAG_SLUG_MAX_LENGTH,
};

#[derive(Debug, Clone, PartialEq)]
pub struct TagForm {
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl TryFrom<&Form> for TagForm {
    type Error = TypeError;

    fn try_from(form: &Form) -> Result<Self, Self::Error> {
        Ok(Self {
            name: form.get_str("name")?.trim().to_string(),
            color: form.get_str("color")?.trim().to_uppercase(),
            slug: form.get_str("slug")?.trim().to_string(),
        })
    }
}

impl TagForm {
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.name.is_empty() || self.name.chars().count() > TAG_NAME_MAX_LENGTH {
            return Err(TypeError::new("Invalid tag name"));
        }
        if !is_hex_color(&self.color) {
            return Err(TypeError::new("Color must be in the format #RRGGBB"));
        }
        if !is_slug(&self.slug) {
            return Err(TypeError::new("Invalid slug"));
        }
        Ok(())
    }
}

static HEX_COLOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[A-Fa-f0-9]{6}$").expect("valid color pattern"));
static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("valid slug pattern"));

pub fn is_hex_color(value: &str) -> bool {
    HEX_COLOR.is_match(value)
}

pub fn is_slug(value: &str) -> bool {
    value.len() <= TAG_SLUG_MAX_LENGTH && SLUG.is_match(value)
}

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, potion::Error> {
    let rows: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name, id")
        .fetch_all(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

pub async fn list_tags_cached(
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Vec<Tag>, potion::Error> {
    get_or(CacheKey::Tags, cache, || list_tags(pool)).await
}

pub async fn get_tag(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Tag>, potion::Error> {
    let row: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(row)
}

pub async fn find_tags_by_slug(
    slugs: &[String],
    pool: &Pool<Postgres>,
) -> Result<Vec<Tag>, potion::Error> {
    if slugs.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<Tag> = sqlx::query_as("SELECT * FROM tags WHERE slug = ANY($1) ORDER BY name")
        .bind(slugs)
        .fetch_all(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

pub async fn create_tag(
    form: &TagForm,
    session: &SessionData,
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Tag, potion::Error> {
    session.authenticate(ActionType::ManageCatalog)?;
    form.validate().map_err(|e| e.into())?;

    let row: Option<Tag> = sqlx::query_as(
        "
        INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        RETURNING *
    ",
    )
    .bind(form.name.as_str())
    .bind(form.color.as_str())
    .bind(form.slug.as_str())
    .fetch_optional(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    let tag = match row {
        Some(tag) => tag,
        None => return Err(HtmlError::InvalidRequest.new("Tag already exists")),
    };

    invalidate_catalog(cache).await?;
    log::info!("> Created tag {} ({})", tag.slug, tag.id);

    Ok(tag)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn colors_are_six_digit_hex() {
        assert!(is_hex_color("#E26C2D"));
        assert!(is_hex_color("#49b64e"));
        assert!(!is_hex_color("E26C2D"));
        assert!(!is_hex_color("#E26C2"));
        assert!(!is_hex_color("#E26C2G"));
        assert!(!is_hex_color("#E26C2D0"));
    }

    #[test]
    fn slugs_are_limited() {
        assert!(is_slug("breakfast"));
        assert!(is_slug("late_night-snack"));
        assert!(!is_slug(""));
        assert!(!is_slug("two words"));
        assert!(!is_slug(&"a".repeat(TAG_SLUG_MAX_LENGTH + 1)));
    }

    #[test]
    fn tag_form_normalizes_color() {
        let data = Form::from_value(json!({
            "name": "Lunch",
            "color": " #aabbcc",
            "slug": "lunch",
        }))
        .unwrap();
        let form = TagForm::try_from(&data).unwrap();

        assert_eq!(form.color, "#AABBCC");
        assert_eq!(form.validate(), Ok(()));
    }
}
