use sighub_core::{Entity, EntityKind, StoreError};
use sqlx::{PgPool, Row};

/// Run embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Load one record.
pub async fn get_entity(
    pool: &PgPool,
    kind: EntityKind,
    id: i64,
) -> Result<Option<Entity>, StoreError> {
    let row = sqlx::query("SELECT body FROM entities WHERE kind = $1 AND id = $2")
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_err)?;

    match row {
        Some(r) => Ok(Some(Entity::from_body(kind, r.get("body"))?)),
        None => Ok(None),
    }
}

/// Load all records of a kind, oldest first.
pub async fn list_entities(pool: &PgPool, kind: EntityKind) -> Result<Vec<Entity>, StoreError> {
    let rows = sqlx::query(
        "SELECT body FROM entities
         WHERE kind = $1
         ORDER BY created_at ASC, id ASC",
    )
    .bind(kind.as_str())
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    rows.into_iter()
        .map(|r| Entity::from_body(kind, r.get("body")).map_err(StoreError::from))
        .collect()
}

/// Insert a record, assigning the next id of its kind when the id is zero.
pub async fn insert_entity(pool: &PgPool, mut entity: Entity) -> Result<i64, StoreError> {
    let kind = entity.kind();
    let mut tx = pool.begin().await.map_err(db_err)?;

    let id = if entity.id() == 0 {
        // Serialise id assignment per kind for the rest of the transaction.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let row = sqlx::query("SELECT COALESCE(MAX(id), 0) + 1 AS next_id FROM entities WHERE kind = $1")
            .bind(kind.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        row.get::<i64, _>("next_id")
    } else {
        entity.id()
    };
    entity.set_id(id);

    let result = sqlx::query(
        "INSERT INTO entities (kind, id, body)
         VALUES ($1, $2, $3)
         ON CONFLICT (kind, id) DO NOTHING",
    )
    .bind(kind.as_str())
    .bind(id)
    .bind(entity.body()?)
    .execute(&mut *tx)
    .await
    .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict { kind, id });
    }

    tx.commit().await.map_err(db_err)?;
    Ok(id)
}

/// Replace the body of an existing record.
pub async fn update_entity(pool: &PgPool, id: i64, mut entity: Entity) -> Result<(), StoreError> {
    let kind = entity.kind();
    entity.set_id(id);

    let result = sqlx::query(
        "UPDATE entities SET body = $3, updated_at = now()
         WHERE kind = $1 AND id = $2",
    )
    .bind(kind.as_str())
    .bind(id)
    .bind(entity.body()?)
    .execute(pool)
    .await
    .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound { kind, id });
    }
    Ok(())
}

/// Delete a record.
pub async fn delete_entity(pool: &PgPool, kind: EntityKind, id: i64) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM entities WHERE kind = $1 AND id = $2")
        .bind(kind.as_str())
        .bind(id)
        .execute(pool)
        .await
        .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound { kind, id });
    }
    Ok(())
}
