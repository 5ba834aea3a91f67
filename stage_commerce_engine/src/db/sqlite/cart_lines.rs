use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db::{
        sqlite::SqliteDatabaseError,
        traits::{RemoveLinesOutcome, UpsertLineResult},
    },
    db_types::{CartLine, LinePatch, LineSpec, OrderLine},
};

pub async fn lines_for_cart(cart_id: i64, conn: &mut SqliteConnection) -> Result<Vec<CartLine>, SqliteDatabaseError> {
    let lines = sqlx::query_as::<_, CartLine>("SELECT * FROM cart_lines WHERE cart_id = $1 ORDER BY id DESC")
        .bind(cart_id)
        .fetch_all(conn)
        .await?;
    Ok(lines)
}

/// Adds the spec to the cart, merging into the existing line with the same identity key if there is one.
///
/// The insert is attempted first and the partial unique indexes on `cart_lines` arbitrate: when the insert loses to
/// an existing key the violation is swallowed and the merge update runs instead. Two concurrent upserts of the same
/// key therefore end as one line carrying both quantities, whichever call wins the insert.
pub async fn upsert_line(
    cart_id: i64,
    spec: LineSpec,
    conn: &mut SqliteConnection,
) -> Result<UpsertLineResult, SqliteDatabaseError> {
    let inserted = sqlx::query_as::<_, CartLine>(
        r#"
            INSERT INTO cart_lines (cart_id, product_id, variant_id, size_label, name, price, image, quantity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(cart_id)
    .bind(spec.product_id)
    .bind(spec.variant_id)
    .bind(&spec.size_label)
    .bind(spec.name.as_deref().unwrap_or(""))
    .bind(spec.price.unwrap_or_default())
    .bind(&spec.image)
    .bind(spec.quantity.max(1))
    .fetch_one(&mut *conn)
    .await;
    match inserted {
        Ok(line) => {
            trace!("🗃️ Cart #{cart_id}: inserted line #{}", line.id);
            Ok(UpsertLineResult::Inserted(line))
        },
        Err(sqlx::Error::Database(de)) if de.is_unique_violation() => {
            let line = merge_line(cart_id, &spec, conn).await?;
            debug!("🗃️ Cart #{cart_id}: merged {} unit(s) into line #{}", spec.quantity.max(1), line.id);
            Ok(UpsertLineResult::Merged(line))
        },
        Err(e) => Err(e.into()),
    }
}

/// Folds the spec's quantity into the existing line with the same identity key and refreshes its display snapshot.
async fn merge_line(
    cart_id: i64,
    spec: &LineSpec,
    conn: &mut SqliteConnection,
) -> Result<CartLine, SqliteDatabaseError> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE cart_lines SET quantity = quantity + ");
    builder.push_bind(spec.quantity.max(1));
    builder.push(", name = COALESCE(");
    builder.push_bind(&spec.name);
    builder.push(", name), price = COALESCE(");
    builder.push_bind(spec.price);
    builder.push(", price), image = COALESCE(");
    builder.push_bind(&spec.image);
    builder.push(", image), updated_at = CURRENT_TIMESTAMP WHERE cart_id = ");
    builder.push_bind(cart_id);
    match spec.variant_id {
        Some(vid) => {
            builder.push(" AND variant_id = ");
            builder.push_bind(vid);
        },
        None => {
            builder.push(" AND variant_id IS NULL AND product_id = ");
            builder.push_bind(spec.product_id);
            builder.push(" AND COALESCE(size_label, '') = COALESCE(");
            builder.push_bind(&spec.size_label);
            builder.push(", '')");
        },
    }
    builder.push(" RETURNING *");
    let line = builder.build_query_as::<CartLine>().fetch_one(conn).await?;
    Ok(line)
}

/// Applies a partial update to a line of the cart. Quantities below 1 are clamped to 1.
pub async fn update_line(
    cart_id: i64,
    line_id: i64,
    patch: LinePatch,
    conn: &mut SqliteConnection,
) -> Result<Option<CartLine>, SqliteDatabaseError> {
    if patch.is_empty() {
        return Err(SqliteDatabaseError::QueryError("empty line patch".to_string()));
    }
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE cart_lines SET ");
    let mut sep = builder.separated(", ");
    if let Some(q) = patch.quantity {
        sep.push("quantity = ");
        sep.push_bind_unseparated(q.max(1));
    }
    if let Some(p) = patch.postponed {
        sep.push("postponed = ");
        sep.push_bind_unseparated(p);
    }
    sep.push("updated_at = CURRENT_TIMESTAMP");
    builder.push(" WHERE id = ");
    builder.push_bind(line_id);
    builder.push(" AND cart_id = ");
    builder.push_bind(cart_id);
    builder.push(" RETURNING *");
    let result = builder.build_query_as::<CartLine>().fetch_one(conn).await;
    match result {
        Err(sqlx::Error::RowNotFound) => Ok(None),
        Err(e) => Err(e.into()),
        Ok(line) => Ok(Some(line)),
    }
}

pub async fn delete_line(cart_id: i64, line_id: i64, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query("DELETE FROM cart_lines WHERE id = $1 AND cart_id = $2")
        .bind(line_id)
        .bind(cart_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes the given lines from the cart. An id with no line behind it is skipped; an id living in another cart
/// stops the pass and is reported back so the caller can roll the transaction back.
pub async fn delete_lines(
    cart_id: i64,
    line_ids: &[i64],
    conn: &mut SqliteConnection,
) -> Result<RemoveLinesOutcome, SqliteDatabaseError> {
    let mut deleted = 0u64;
    for &line_id in line_ids {
        let owner = sqlx::query_scalar::<_, i64>("SELECT cart_id FROM cart_lines WHERE id = $1")
            .bind(line_id)
            .fetch_optional(&mut *conn)
            .await?;
        match owner {
            None => continue,
            Some(owner) if owner != cart_id => return Ok(RemoveLinesOutcome::ForeignLine(line_id)),
            Some(_) => {
                if delete_line(cart_id, line_id, &mut *conn).await? {
                    deleted += 1;
                }
            },
        }
    }
    Ok(RemoveLinesOutcome::Removed(deleted))
}

pub async fn clear_lines(cart_id: i64, conn: &mut SqliteConnection) -> Result<u64, SqliteDatabaseError> {
    let result = sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1").bind(cart_id).execute(conn).await?;
    Ok(result.rows_affected())
}

/// Removes one purchased line's worth of goods from the cart. Deletes the back-referenced cart line outright when
/// it still exists; otherwise decrements the (product, size) match and deletes it when nothing remains. Returns
/// true when a cart line was deleted.
pub async fn purge_one(
    cart_id: i64,
    purchased: &OrderLine,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    if let Some(line_id) = purchased.cart_line_id {
        if delete_line(cart_id, line_id, &mut *conn).await? {
            return Ok(true);
        }
    }
    let remaining = sqlx::query_as::<_, (i64, i64)>(
        r#"
            UPDATE cart_lines
            SET quantity = quantity - $1, updated_at = CURRENT_TIMESTAMP
            WHERE cart_id = $2 AND product_id = $3 AND COALESCE(size_label, '') = COALESCE($4, '')
            RETURNING id, quantity;
        "#,
    )
    .bind(purchased.quantity.max(1))
    .bind(cart_id)
    .bind(purchased.product_id)
    .bind(&purchased.size_label)
    .fetch_one(&mut *conn)
    .await;
    match remaining {
        // No surviving match in the cart. Nothing to purge.
        Err(sqlx::Error::RowNotFound) => Ok(false),
        Err(e) => Err(e.into()),
        Ok((line_id, quantity)) if quantity <= 0 => delete_line(cart_id, line_id, conn).await,
        Ok(_) => Ok(false),
    }
}
