use std::collections::HashSet;

use potion::HtmlError;
use serde_json::Value;
use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    authentication::permissions::ActionType,
    error::{QueryError, TypeError},
    form::{parse_number, Form},
    jwt::SessionData,
    schema::{
        Recipe, RecipeCollection, RecipeDetails, RecipeIngredientRow, RecipeSummary, Tag,
        UserProfile, Uuid,
    },
    RECIPE_COUNT_PER_PAGE, RECIPE_NAME_MAX_LENGTH,
};

use super::{get_user_by_id, is_in_collection, is_subscribed};

#[derive(Debug, Clone, PartialEq)]
pub struct IngredientAmountForm {
    pub id: Uuid,
    pub amount: i32,
}

/// Payload of recipe creation and update.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeForm {
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub tags: Vec<Uuid>,
    pub ingredients: Vec<IngredientAmountForm>,
}

impl TryFrom<&Form> for RecipeForm {
    type Error = TypeError;

    fn try_from(form: &Form) -> Result<Self, Self::Error> {
        let tags = form
            .get_list("tags")?
            .iter()
            .map(|tag| parse_number::<Uuid>(tag).ok_or_else(|| TypeError::new("Invalid tag id")))
            .collect::<Result<Vec<Uuid>, TypeError>>()?;

        let ingredients = form
            .get_list("ingredients")?
            .into_iter()
            .map(|item| {
                let item = Form::from_value(item)?;
                Ok(IngredientAmountForm {
                    id: item.get_number("id")?,
                    amount: item.get_number("amount")?,
                })
            })
            .collect::<Result<Vec<IngredientAmountForm>, TypeError>>()?;

        Ok(Self {
            name: form.get_str("name")?,
            image: form.get_str("image").unwrap_or_default(),
            text: form.get_str("text")?,
            cooking_time: form.get_number("cooking_time")?,
            tags,
            ingredients,
        })
    }
}

impl TryFrom<Value> for RecipeForm {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let form = Form::from_value(value)?;
        RecipeForm::try_from(&form)
    }
}

impl RecipeForm {
    pub fn validate(&self) -> Result<(), TypeError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(TypeError::new("Recipe name is required"));
        }
        if name.chars().count() > RECIPE_NAME_MAX_LENGTH {
            return Err(TypeError::new("Recipe name is too long"));
        }
        if self.cooking_time < 1 {
            return Err(TypeError::new("Cooking time must be at least 1 minute"));
        }

        if self.tags.is_empty() {
            return Err(TypeError::new("At least one tag is required"));
        }
        let mut tags = HashSet::new();
        if !self.tags.iter().all(|tag| tags.insert(*tag)) {
            return Err(TypeError::new("Tags must be unique"));
        }

        if self.ingredients.is_empty() {
            return Err(TypeError::new("At least one ingredient is required"));
        }
        let mut ingredients = HashSet::new();
        for item in self.ingredients.iter() {
            if !ingredients.insert(item.id) {
                return Err(TypeError::new("Ingredients must be unique"));
            }
            if item.amount < 1 {
                return Err(TypeError::new("Ingredient amount must be at least 1"));
            }
        }

        Ok(())
    }

    fn ingredient_ids(&self) -> Vec<Uuid> {
        self.ingredients.iter().map(|item| item.id).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    /// Tag slugs; a recipe matches when it carries any of them.
    pub tags: Vec<String>,
    pub author: Option<Uuid>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeFilter {
    pub fn from_query(form: &Form) -> Self {
        let flag = |key: &str| {
            form.get_str(key)
                .map(|v| matches!(v.as_str(), "1" | "true"))
                .or_else(|_| form.get_number::<i32>(key).map(|v| v == 1))
                .unwrap_or(false)
        };

        Self {
            tags: form
                .get_list("tags")
                .map(|tags| {
                    tags.iter()
                        .filter_map(|tag| tag.as_str().map(|s| s.to_string()))
                        .collect()
                })
                .or_else(|_| form.get_str("tags").map(|tag| vec![tag]))
                .unwrap_or_default(),
            author: form.get_number("author").ok(),
            is_favorited: flag("is_favorited"),
            is_in_shopping_cart: flag("is_in_shopping_cart"),
        }
    }
}

/// Builds the recipe listing query. Per-user flags need a viewer and are
/// ignored for anonymous requests.
pub fn recipe_query(
    filter: &RecipeFilter,
    viewer: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> QueryBuilder<'static, Postgres> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT r.* FROM recipes r WHERE TRUE");

    if !filter.tags.is_empty() {
        builder
            .push(" AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug = ANY(")
            .push_bind(filter.tags.clone())
            .push("))");
    }

    if let Some(author) = filter.author {
        builder.push(" AND r.author_id = ").push_bind(author);
    }

    if let Some(user_id) = viewer {
        let collections = [
            (filter.is_favorited, RecipeCollection::Favorites),
            (filter.is_in_shopping_cart, RecipeCollection::ShoppingCart),
        ];

        for (_, collection) in collections.iter().filter(|(enabled, _)| *enabled) {
            builder
                .push(format!(
                    " AND EXISTS (SELECT 1 FROM {} c WHERE c.recipe_id = r.id AND c.user_id = ",
                    collection.table()
                ))
                .push_bind(user_id)
                .push(")");
        }
    }

    builder
        .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    builder
}

pub async fn fetch_recipes(
    filter: &RecipeFilter,
    viewer: Option<&SessionData>,
    limit: Option<i64>,
    offset: i64,
    pool: &Pool<Postgres>,
) -> Result<Vec<Recipe>, potion::Error> {
    let limit = limit.unwrap_or(RECIPE_COUNT_PER_PAGE);
    let rows: Vec<Recipe> = recipe_query(filter, viewer.map(|s| s.user_id), limit, offset)
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

pub async fn get_recipe(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Recipe>, potion::Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(row)
}

pub async fn get_recipe_summary(
    id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeSummary>, potion::Error> {
    let row: Option<RecipeSummary> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| QueryError::from(e).into())?;

    Ok(row)
}

/// Loads a recipe the session may modify: its own, or any with `ManageAllRecipes`.
pub async fn get_recipe_mut(
    id: Uuid,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, potion::Error> {
    session.authenticate(ActionType::ManageOwnRecipes)?;

    match get_recipe(id, pool).await? {
        Some(recipe) => {
            session.authenticate_owner(recipe.author_id, ActionType::ManageAllRecipes)?;
            Ok(recipe)
        }
        None => Err(HtmlError::InvalidRequest.new("No recipe exists with specified id")),
    }
}

pub async fn get_recipe_details(
    id: Uuid,
    viewer: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeDetails>, potion::Error> {
    let recipe = match get_recipe(id, pool).await? {
        Some(recipe) => recipe,
        None => return Ok(None),
    };

    let author = get_user_by_id(pool, recipe.author_id)
        .await?
        .ok_or_else(|| HtmlError::InternalServerError.new("Recipe author is missing"))?;

    let (is_favorited, is_in_shopping_cart) = recipe_flags(id, viewer, pool).await?;
    let author_followed = match viewer {
        Some(session) => is_subscribed(session.user_id, author.id, pool).await?,
        None => false,
    };

    Ok(Some(RecipeDetails {
        tags: list_recipe_tags(pool, id).await?,
        ingredients: list_recipe_ingredients(pool, id).await?,
        author: UserProfile::from_user(author, author_followed),
        recipe,
        is_favorited,
        is_in_shopping_cart,
    }))
}

/// `(is_favorited, is_in_shopping_cart)` for the viewer; both false when anonymous.
pub async fn recipe_flags(
    recipe_id: Uuid,
    viewer: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<(bool, bool), potion::Error> {
    match viewer {
        Some(session) => Ok((
            is_in_collection(RecipeCollection::Favorites, session.user_id, recipe_id, pool)
                .await?,
            is_in_collection(RecipeCollection::ShoppingCart, session.user_id, recipe_id, pool)
                .await?,
        )),
        None => Ok((false, false)),
    }
}

pub async fn list_recipe_ingredients(
    pool: &Pool<Postgres>,
    recipe_id: Uuid,
) -> Result<Vec<RecipeIngredientRow>, potion::Error> {
    let rows: Vec<RecipeIngredientRow> = sqlx::query_as(
        "
        SELECT ri.ingredient_id AS ingredient_id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = $1
        ORDER BY i.name
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

pub async fn list_recipe_tags(
    pool: &Pool<Postgres>,
    recipe_id: Uuid,
) -> Result<Vec<Tag>, potion::Error> {
    let rows: Vec<Tag> = sqlx::query_as(
        "
        SELECT t.*
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = $1
        ORDER BY t.name
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

pub async fn list_author_recipes(
    author_id: Uuid,
    limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeSummary>, potion::Error> {
    let rows: Vec<RecipeSummary> = sqlx::query_as(
        "
        SELECT id, name, image, cooking_time FROM recipes
        WHERE author_id = $1
        ORDER BY pub_date DESC, id DESC
        LIMIT $2
    ",
    )
    .bind(author_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

pub async fn count_author_recipes(
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<i64, potion::Error> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(count.0)
}

pub async fn create_recipe(
    form: &RecipeForm,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Uuid, potion::Error> {
    session.authenticate(ActionType::CreateRecipes)?;
    form.validate().map_err(|e| e.into())?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()).into())?;

    ensure_references_exist(&mut tr, form).await?;

    let id: (Uuid,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(session.user_id)
    .bind(form.name.trim())
    .bind(form.image.as_str())
    .bind(form.text.as_str())
    .bind(form.cooking_time)
    .fetch_one(&mut *tr)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    replace_recipe_links(&mut tr, id.0, form).await?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction".to_owned()).into())?;

    Ok(id.0)
}

pub async fn update_recipe(
    id: Uuid,
    form: &RecipeForm,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    get_recipe_mut(id, session, pool).await?;
    form.validate().map_err(|e| e.into())?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()).into())?;

    ensure_references_exist(&mut tr, form).await?;

    sqlx::query(
        "UPDATE recipes SET name = $1, image = $2, text = $3, cooking_time = $4 WHERE id = $5",
    )
    .bind(form.name.trim())
    .bind(form.image.as_str())
    .bind(form.text.as_str())
    .bind(form.cooking_time)
    .bind(id)
    .execute(&mut *tr)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    replace_recipe_links(&mut tr, id, form).await?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction".to_owned()).into())?;

    Ok(())
}

pub async fn delete_recipe(
    id: Uuid,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    get_recipe_mut(id, session, pool).await?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()).into())?;

    for table in [
        "recipe_tags",
        "recipe_ingredients",
        RecipeCollection::Favorites.table(),
        RecipeCollection::ShoppingCart.table(),
    ] {
        sqlx::query(&format!("DELETE FROM {table} WHERE recipe_id = $1"))
            .bind(id)
            .execute(&mut *tr)
            .await
            .map_err(|e| QueryError::from(e).into())?;
    }

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction".to_owned()).into())?;

    Ok(())
}

async fn ensure_references_exist(
    tr: &mut Transaction<'_, Postgres>,
    form: &RecipeForm,
) -> Result<(), potion::Error> {
    let ingredients: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM ingredients WHERE id = ANY($1)")
            .bind(form.ingredient_ids())
            .fetch_one(&mut **tr)
            .await
            .map_err(|e| QueryError::from(e).into())?;

    if ingredients.0 != form.ingredients.len() as i64 {
        return Err(HtmlError::InvalidRequest.new("Ingredient doesn't exist"));
    }

    let tags: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags WHERE id = ANY($1)")
        .bind(form.tags.clone())
        .fetch_one(&mut **tr)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    if tags.0 != form.tags.len() as i64 {
        return Err(HtmlError::InvalidRequest.new("Tag doesn't exist"));
    }

    Ok(())
}

/// Replaces the tag and ingredient sets of a recipe. Each (recipe, ingredient)
/// pair is inserted exactly once.
async fn replace_recipe_links(
    tr: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    form: &RecipeForm,
) -> Result<(), potion::Error> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tr)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tr)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    let mut tags: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    tags.push_values(form.tags.iter(), |mut b, tag_id| {
        b.push_bind(recipe_id).push_bind(*tag_id);
    });
    tags.build()
        .execute(&mut **tr)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    let mut ingredients: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ",
    );
    ingredients.push_values(form.ingredients.iter(), |mut b, item| {
        b.push_bind(recipe_id)
            .push_bind(item.id)
            .push_bind(item.amount);
    });
    ingredients
        .build()
        .execute(&mut **tr)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn valid_form() -> RecipeForm {
        RecipeForm {
            name: String::from("Pancakes"),
            image: String::new(),
            text: String::from("Mix and fry."),
            cooking_time: 20,
            tags: vec![1],
            ingredients: vec![
                IngredientAmountForm { id: 1, amount: 2 },
                IngredientAmountForm { id: 2, amount: 100 },
            ],
        }
    }

    #[test]
    fn parses_recipe_payload() {
        let form = RecipeForm::try_from(json!({
            "name": "Pancakes",
            "text": "Mix and fry.",
            "cooking_time": "20",
            "tags": [1],
            "ingredients": [{ "id": 1, "amount": 2 }, { "id": "2", "amount": "100" }],
        }))
        .unwrap();

        assert_eq!(form, valid_form());
    }

    #[test]
    fn missing_ingredient_amount_is_rejected() {
        let result = RecipeForm::try_from(json!({
            "name": "Pancakes",
            "text": "",
            "cooking_time": 5,
            "tags": [1],
            "ingredients": [{ "id": 1 }],
        }));

        assert_eq!(result.unwrap_err().info(), "Missing field amount");
    }

    #[test]
    fn validation_accepts_a_complete_recipe() {
        assert_eq!(valid_form().validate(), Ok(()));
    }

    #[test]
    fn validation_rejects_duplicate_ingredients() {
        let mut form = valid_form();
        form.ingredients.push(IngredientAmountForm { id: 1, amount: 3 });

        assert_eq!(form.validate().unwrap_err().info(), "Ingredients must be unique");
    }

    #[test]
    fn validation_rejects_non_positive_amounts_and_times() {
        let mut form = valid_form();
        form.ingredients[0].amount = 0;
        assert!(form.validate().is_err());

        let mut form = valid_form();
        form.cooking_time = 0;
        assert!(form.validate().is_err());
    }

    #[test]
    fn validation_requires_ingredients_and_tags() {
        let mut form = valid_form();
        form.ingredients.clear();
        assert_eq!(
            form.validate().unwrap_err().info(),
            "At least one ingredient is required"
        );

        let mut form = valid_form();
        form.tags.clear();
        assert!(form.validate().is_err());
    }

    #[test]
    fn anonymous_listing_ignores_per_user_flags() {
        let filter = RecipeFilter {
            is_favorited: true,
            is_in_shopping_cart: true,
            ..Default::default()
        };
        let query = recipe_query(&filter, None, 6, 0);

        assert!(!query.sql().contains("shopping_cart"));
        assert!(!query.sql().contains("favorite_recipes"));
    }

    #[test]
    fn cart_filter_uses_the_join_table() {
        let filter = RecipeFilter {
            tags: vec![String::from("breakfast")],
            author: Some(3),
            is_in_shopping_cart: true,
            ..Default::default()
        };
        let query = recipe_query(&filter, Some(9), 6, 12);
        let sql = query.sql();

        assert!(sql.contains("t.slug = ANY($1)"));
        assert!(sql.contains("r.author_id = $2"));
        assert!(sql.contains("FROM shopping_cart c WHERE c.recipe_id = r.id AND c.user_id = $3"));
        assert!(!sql.contains("favorite_recipes"));
        assert!(sql.ends_with("LIMIT $4 OFFSET $5"));
    }

    #[test]
    fn filter_from_query_string_values() {
        let form = Form::from_value(json!({
            "tags": ["lunch", "dinner"],
            "author": "4",
            "is_favorited": "1",
            "is_in_shopping_cart": "0",
        }))
        .unwrap();

        assert_eq!(
            RecipeFilter::from_query(&form),
            RecipeFilter {
                tags: vec![String::from("lunch"), String::from("dinner")],
                author: Some(4),
                is_favorited: true,
                is_in_shopping_cart: false,
            }
        );
    }
}
