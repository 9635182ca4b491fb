use std::collections::{BTreeMap, HashMap};

use sqlx::{Pool, Postgres, Transaction};

use crate::{
    error::{QueryError, ShoppingListError},
    jwt::SessionData,
    schema::{Ingredient, RecipeIngredient, ShoppingListEntry, Uuid},
};

/// The reads a shopping list is built from.
#[allow(async_fn_in_trait)]
pub trait CartSource {
    /// Recipes currently in the user's cart.
    async fn cart_recipe_ids(&mut self, user_id: Uuid) -> Result<Vec<Uuid>, potion::Error>;

    /// Every ingredient amount of the given recipes.
    async fn ingredient_amounts(
        &mut self,
        recipe_ids: &[Uuid],
    ) -> Result<Vec<RecipeIngredient>, potion::Error>;

    /// Catalog rows of the given ingredients.
    async fn ingredient_info(
        &mut self,
        ingredient_ids: &[Uuid],
    ) -> Result<Vec<Ingredient>, potion::Error>;
}

/// Cart reads pinned to one read-only snapshot of the database.
pub struct PgCartSnapshot {
    tr: Transaction<'static, Postgres>,
}

impl PgCartSnapshot {
    pub async fn begin(pool: &Pool<Postgres>) -> Result<Self, potion::Error> {
        let mut tr = pool.begin().await.map_err(|e| QueryError::from(e).into())?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tr)
            .await
            .map_err(|e| QueryError::from(e).into())?;

        Ok(Self { tr })
    }

    pub async fn finish(self) -> Result<(), potion::Error> {
        self.tr
            .commit()
            .await
            .map_err(|e| QueryError::from(e).into())?;

        Ok(())
    }
}

impl CartSource for PgCartSnapshot {
    async fn cart_recipe_ids(&mut self, user_id: Uuid) -> Result<Vec<Uuid>, potion::Error> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT recipe_id FROM shopping_cart WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&mut *self.tr)
                .await
                .map_err(|e| QueryError::from(e).into())?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn ingredient_amounts(
        &mut self,
        recipe_ids: &[Uuid],
    ) -> Result<Vec<RecipeIngredient>, potion::Error> {
        let rows: Vec<RecipeIngredient> = sqlx::query_as(
            "
            SELECT recipe_id, ingredient_id, amount
            FROM recipe_ingredients
            WHERE recipe_id = ANY($1)
        ",
        )
        .bind(recipe_ids)
        .fetch_all(&mut *self.tr)
        .await
        .map_err(|e| QueryError::from(e).into())?;

        Ok(rows)
    }

    async fn ingredient_info(
        &mut self,
        ingredient_ids: &[Uuid],
    ) -> Result<Vec<Ingredient>, potion::Error> {
        let rows: Vec<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = ANY($1)")
            .bind(ingredient_ids)
            .fetch_all(&mut *self.tr)
            .await
            .map_err(|e| QueryError::from(e).into())?;

        Ok(rows)
    }
}

/// Sums `amounts` per ingredient id and names each group from `catalog`.
/// Ordered by name, then unit, then id.
pub fn aggregate(amounts: &[RecipeIngredient], catalog: &[Ingredient]) -> Vec<ShoppingListEntry> {
    let mut totals: BTreeMap<Uuid, i64> = BTreeMap::new();
    for row in amounts {
        *totals.entry(row.ingredient_id).or_insert(0) += i64::from(row.amount);
    }

    let catalog: HashMap<Uuid, &Ingredient> = catalog.iter().map(|i| (i.id, i)).collect();

    let mut entries: Vec<ShoppingListEntry> = totals
        .into_iter()
        .filter_map(|(id, total_amount)| match catalog.get(&id) {
            Some(ingredient) => Some(ShoppingListEntry {
                ingredient_id: id,
                name: ingredient.name.to_owned(),
                measurement_unit: ingredient.measurement_unit.to_owned(),
                total_amount,
            }),
            None => {
                log::warn!("> Ingredient {id} is missing from the catalog, skipping");
                None
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.measurement_unit.cmp(&b.measurement_unit))
            .then_with(|| a.ingredient_id.cmp(&b.ingredient_id))
    });

    entries
}

/// Builds the shopping list of the session's cart. An empty cart is an empty list.
pub async fn collect_shopping_list<S: CartSource>(
    session: Option<&SessionData>,
    source: &mut S,
) -> Result<Vec<ShoppingListEntry>, ShoppingListError> {
    let session = match session {
        Some(session) => session,
        None => return Err(ShoppingListError::Unauthenticated),
    };

    let recipe_ids = source.cart_recipe_ids(session.user_id).await?;
    if recipe_ids.is_empty() {
        return Ok(vec![]);
    }

    let amounts = source.ingredient_amounts(&recipe_ids).await?;
    if amounts.is_empty() {
        return Ok(vec![]);
    }

    let mut ingredient_ids: Vec<Uuid> = amounts.iter().map(|row| row.ingredient_id).collect();
    ingredient_ids.sort_unstable();
    ingredient_ids.dedup();

    let catalog = source.ingredient_info(&ingredient_ids).await?;

    log::trace!(
        "> Aggregating {} rows from {} recipes for user {}",
        amounts.len(),
        recipe_ids.len(),
        session.user_id
    );
    Ok(aggregate(&amounts, &catalog))
}

/// [`collect_shopping_list`] over a fresh database snapshot.
pub async fn build_shopping_list(
    session: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<Vec<ShoppingListEntry>, ShoppingListError> {
    if session.is_none() {
        return Err(ShoppingListError::Unauthenticated);
    }

    let mut snapshot = PgCartSnapshot::begin(pool).await?;
    let entries = collect_shopping_list(session, &mut snapshot).await?;
    snapshot.finish().await?;

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingredient(id: Uuid, name: &str, unit: &str) -> Ingredient {
        Ingredient {
            id,
            name: String::from(name),
            measurement_unit: String::from(unit),
        }
    }

    fn row(recipe_id: Uuid, ingredient_id: Uuid, amount: i32) -> RecipeIngredient {
        RecipeIngredient {
            recipe_id,
            ingredient_id,
            amount,
        }
    }

    #[test]
    fn duplicate_rows_within_a_recipe_are_summed() {
        let catalog = vec![ingredient(1, "salt", "g")];
        let entries = aggregate(&[row(1, 1, 2), row(1, 1, 3)], &catalog);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].total_amount, 5);
    }

    #[test]
    fn sums_do_not_overflow_i32() {
        let catalog = vec![ingredient(1, "water", "ml")];
        let entries = aggregate(&[row(1, 1, i32::MAX), row(2, 1, i32::MAX)], &catalog);

        assert_eq!(entries[0].total_amount, 2 * i64::from(i32::MAX));
    }

    #[test]
    fn ties_on_name_break_by_unit_then_id() {
        let catalog = vec![
            ingredient(3, "sugar", "kg"),
            ingredient(2, "sugar", "g"),
            ingredient(1, "sugar", "g"),
        ];
        let entries = aggregate(&[row(1, 3, 1), row(1, 2, 1), row(1, 1, 1)], &catalog);

        let ids: Vec<Uuid> = entries.iter().map(|e| e.ingredient_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn uncatalogued_ingredients_are_skipped() {
        let catalog = vec![ingredient(1, "salt", "g")];
        let entries = aggregate(&[row(1, 1, 2), row(1, 9, 3)], &catalog);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "salt");
    }
}
