use potion::HtmlError;
use sqlx::{Pool, Postgres};

use crate::{
    authentication::permissions::ActionType,
    error::QueryError,
    jwt::SessionData,
    schema::{RecipeCollection, RecipeSummary, Uuid},
};

use super::get_recipe_summary;

pub async fn is_in_collection(
    collection: RecipeCollection,
    user_id: Uuid,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<bool, potion::Error> {
    let result: Option<(Uuid,)> = sqlx::query_as(&format!(
        "SELECT recipe_id FROM {} WHERE user_id = $1 AND recipe_id = $2",
        collection.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(result.is_some())
}

/// Adds a recipe to one of the session's lists. Each recipe can be added once.
pub async fn add_to_collection(
    collection: RecipeCollection,
    recipe_id: Uuid,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<RecipeSummary, potion::Error> {
    session.authenticate(ActionType::ManageOwnLists)?;

    let recipe = match get_recipe_summary(recipe_id, pool).await? {
        Some(recipe) => recipe,
        None => return Err(HtmlError::InvalidRequest.new("Recipe doesn't exist")),
    };

    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        collection.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::InvalidRequest.new(collection.already_added()));
    }

    Ok(recipe)
}

pub async fn remove_from_collection(
    collection: RecipeCollection,
    recipe_id: Uuid,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    session.authenticate(ActionType::ManageOwnLists)?;

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        collection.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::InvalidRequest.new(collection.not_present()));
    }

    Ok(())
}

pub async fn list_collection(
    collection: RecipeCollection,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeSummary>, potion::Error> {
    let rows: Vec<RecipeSummary> = sqlx::query_as(&format!(
        "
        SELECT r.id, r.name, r.image, r.cooking_time
        FROM {} c
        INNER JOIN recipes r ON r.id = c.recipe_id
        WHERE c.user_id = $1
        ORDER BY c.date_added DESC
    ",
        collection.table()
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}
