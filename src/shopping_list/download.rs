use std::collections::HashMap;

use sqlx::{Pool, Postgres};
use warp::{reject::Rejection, reply::Reply, Filter};

use crate::{
    constants::SHOPPING_LIST_FILENAME,
    error::ShoppingListError,
    jwt::{SessionData, SessionKeys},
    middleware::with_possible_session,
};

use super::{build_shopping_list, render_shopping_list, ListFormat};

/// `GET /recipes/download_shopping_cart?format=plain|numbered`
pub fn shopping_cart_download(
    keys: SessionKeys,
    pool: Pool<Postgres>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_possible_session(keys))
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::any().map(move || pool.clone()))
        .and_then(download_shopping_cart)
}

/// Sends the session's aggregated cart as a text attachment.
pub async fn download_shopping_cart(
    session: Option<SessionData>,
    query: HashMap<String, String>,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    if session.is_none() {
        let error: Rejection = ShoppingListError::Unauthenticated.into();
        return Err(error);
    }

    let format = ListFormat::from_query(query.get("format").map(String::as_str))
        .map_err(|e| -> Rejection { e.into() })?;

    let entries = build_shopping_list(session.as_ref(), &pool)
        .await
        .map_err(|e| -> Rejection { e.into() })?;
    let document =
        render_shopping_list(&entries, format).map_err(|e| -> Rejection { e.into() })?;

    Ok(attachment(document))
}

fn attachment(document: String) -> impl Reply {
    warp::reply::with_header(
        document,
        "content-disposition",
        format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
    )
}
