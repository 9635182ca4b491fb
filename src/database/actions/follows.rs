use potion::HtmlError;
use sqlx::{Pool, Postgres};

use crate::{
    authentication::permissions::ActionType,
    error::{QueryError, TypeError},
    jwt::SessionData,
    schema::{Subscription, User, Uuid},
};

use super::{count_author_recipes, get_user_by_id, list_author_recipes};

pub fn check_subscription(user_id: Uuid, author_id: Uuid) -> Result<(), TypeError> {
    if user_id == author_id {
        return Err(TypeError::new("You cannot subscribe to yourself"));
    }
    Ok(())
}

pub async fn is_subscribed(
    user_id: Uuid,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<bool, potion::Error> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("SELECT author_id FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(user_id)
            .bind(author_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| QueryError::from(e).into())?;

    Ok(row.is_some())
}

pub async fn subscribe(
    author_id: Uuid,
    recipes_limit: Option<i64>,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Subscription, potion::Error> {
    session.authenticate(ActionType::ManageOwnLists)?;
    check_subscription(session.user_id, author_id).map_err(|e| e.into())?;

    let author = match get_user_by_id(pool, author_id).await? {
        Some(author) => author,
        None => return Err(HtmlError::InvalidRequest.new("User doesn't exist")),
    };

    let result = sqlx::query(
        "INSERT INTO follows (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(session.user_id)
    .bind(author_id)
    .execute(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::InvalidRequest.new("Already subscribed to this user"));
    }

    build_subscription(author, recipes_limit, pool).await
}

pub async fn unsubscribe(
    author_id: Uuid,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    session.authenticate(ActionType::ManageOwnLists)?;

    let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
        .bind(session.user_id)
        .bind(author_id)
        .execute(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::InvalidRequest.new("Not subscribed to this user"));
    }

    Ok(())
}

pub async fn list_subscriptions(
    user_id: Uuid,
    recipes_limit: Option<i64>,
    limit: i64,
    offset: i64,
    pool: &Pool<Postgres>,
) -> Result<Vec<Subscription>, potion::Error> {
    let authors: Vec<User> = sqlx::query_as(
        "
        SELECT u.*
        FROM follows f
        INNER JOIN users u ON u.id = f.author_id
        WHERE f.user_id = $1
        ORDER BY f.subscription_date DESC, u.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    let mut subscriptions = Vec::with_capacity(authors.len());
    for author in authors {
        subscriptions.push(build_subscription(author, recipes_limit, pool).await?);
    }

    Ok(subscriptions)
}

async fn build_subscription(
    author: User,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Subscription, potion::Error> {
    let recipes = list_author_recipes(author.id, recipes_limit, pool).await?;
    let recipes_count = count_author_recipes(author.id, pool).await?;

    Ok(Subscription {
        id: author.id,
        email: author.email,
        username: author.username,
        first_name: author.first_name,
        last_name: author.last_name,
        is_subscribed: true,
        recipes,
        recipes_count,
    })
}
