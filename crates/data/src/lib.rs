pub mod db;
pub mod fx;

use async_trait::async_trait;
use indexmap::IndexMap;
use sighub_core::{Entity, EntityKind, Store, StoreError};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// An in-process store.
///
/// Records of each kind are kept in insertion order, so `list` reflects the
/// order writes happened in.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<EntityKind, IndexMap<i64, Entity>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records of a kind.
    pub async fn count(&self, kind: EntityKind) -> usize {
        self.tables
            .read()
            .await
            .get(&kind)
            .map(|t| t.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, kind: EntityKind, id: i64) -> Result<Option<Entity>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.get(&kind).and_then(|t| t.get(&id)).cloned())
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&kind)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&self, mut entity: Entity) -> Result<i64, StoreError> {
        let kind = entity.kind();
        let mut tables = self.tables.write().await;
        let table = tables.entry(kind).or_default();

        let id = if entity.id() == 0 {
            table.keys().copied().max().unwrap_or(0) + 1
        } else {
            entity.id()
        };
        if table.contains_key(&id) {
            return Err(StoreError::Conflict { kind, id });
        }
        entity.set_id(id);
        table.insert(id, entity);
        Ok(id)
    }

    async fn update(&self, id: i64, mut entity: Entity) -> Result<(), StoreError> {
        let kind = entity.kind();
        let mut tables = self.tables.write().await;
        let slot = tables
            .get_mut(&kind)
            .and_then(|t| t.get_mut(&id))
            .ok_or(StoreError::NotFound { kind, id })?;
        entity.set_id(id);
        *slot = entity;
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .get_mut(&kind)
            .and_then(|t| t.shift_remove(&id))
            .map(|_| ())
            .ok_or(StoreError::NotFound { kind, id })
    }
}

/// A PostgreSQL-backed store.
pub struct PostgresStore {
    pub pool: sqlx::PgPool,
}

impl PostgresStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn get(&self, kind: EntityKind, id: i64) -> Result<Option<Entity>, StoreError> {
        db::get_entity(&self.pool, kind, id).await
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>, StoreError> {
        db::list_entities(&self.pool, kind).await
    }

    async fn insert(&self, entity: Entity) -> Result<i64, StoreError> {
        db::insert_entity(&self.pool, entity).await
    }

    async fn update(&self, id: i64, entity: Entity) -> Result<(), StoreError> {
        db::update_entity(&self.pool, id, entity).await
    }

    async fn delete(&self, kind: EntityKind, id: i64) -> Result<(), StoreError> {
        db::delete_entity(&self.pool, kind, id).await
    }
}
