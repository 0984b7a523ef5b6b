use crate::models::*;
use crate::protocol::*;
use async_trait::async_trait;
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i64 },
    #[error("{kind} {id} already exists")]
    Conflict { kind: EntityKind, id: i64 },
    #[error("Expected {expected}, got {actual}")]
    KindMismatch {
        expected: EntityKind,
        actual: EntityKind,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(String),
}

/// Key-value-like object store indexed by entity kind and numeric id.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch one record, `None` when absent.
    async fn get(&self, kind: EntityKind, id: i64) -> Result<Option<Entity>, StoreError>;

    /// All records of a kind.
    async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>, StoreError>;

    /// Persist a new record and return its id.
    ///
    /// An entity id of `0` asks the store to assign one; any other id is
    /// kept as is and must not already exist.
    async fn insert(&self, entity: Entity) -> Result<i64, StoreError>;

    /// Replace an existing record.
    async fn update(&self, id: i64, entity: Entity) -> Result<(), StoreError>;

    /// Remove a record.
    async fn delete(&self, kind: EntityKind, id: i64) -> Result<(), StoreError>;
}

/// Typed helpers over [`Store`], resolved per record type at compile time.
#[async_trait]
pub trait StoreExt: Store {
    async fn get_record<T: Record>(&self, id: i64) -> Result<Option<T>, StoreError> {
        match self.get(T::KIND, id).await? {
            Some(entity) => downcast(entity).map(Some),
            None => Ok(None),
        }
    }

    async fn list_records<T: Record>(&self) -> Result<Vec<T>, StoreError> {
        self.list(T::KIND)
            .await?
            .into_iter()
            .map(downcast)
            .collect()
    }

    async fn insert_record<T: Record>(&self, record: T) -> Result<i64, StoreError> {
        self.insert(record.into_entity()).await
    }

    async fn update_record<T: Record>(&self, record: T) -> Result<(), StoreError> {
        let id = record.id();
        self.update(id, record.into_entity()).await
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

fn downcast<T: Record>(entity: Entity) -> Result<T, StoreError> {
    let actual = entity.kind();
    T::from_entity(entity).ok_or(StoreError::KindMismatch {
        expected: T::KIND,
        actual,
    })
}

// ---------------------------------------------------------------------------
// External FX feed
// ---------------------------------------------------------------------------

/// Errors from the external FX feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Unexpected status: {0}")]
    Status(u16),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Request timed out")]
    Timeout,
}

/// Source of the supplementary cross rate appended to rate updates.
#[async_trait]
pub trait FxFeed: Send + Sync {
    /// Pair name the rate is published under (e.g. `USDBYN`).
    fn symbol(&self) -> &str;

    /// Fetch the official rate; `0` when the feed has no entry.
    async fn fetch_rate(&self) -> Result<Decimal, FeedError>;
}

// ---------------------------------------------------------------------------
// Transport & collaborators
// ---------------------------------------------------------------------------

/// Fan-out to every live session.
pub trait Broadcaster: Send + Sync {
    /// Send text to all sessions; returns how many received it.
    fn multicast_text(&self, text: String) -> usize;
}

/// Receives cluster-flagged signals verbatim.
#[async_trait]
pub trait ClusterRelay: Send + Sync {
    async fn post_signal(&self, signal: Signal);
}

/// Produces the reply for signal kinds the dispatcher does not classify.
#[async_trait]
pub trait SignalResponder: Send + Sync {
    async fn respond(&self, signal: &Signal) -> Option<Signal>;
}

/// Process log sink behind log-post signals and the log UI messages.
pub trait LogSink: Send + Sync {
    fn post_signal_log(&self, signal: &Signal);
    fn write(&self, line: &str);
    fn all_text(&self) -> String;
    fn clear(&self);
}

/// Tracks open positions reported by terminals.
pub trait PositionTracker: Send + Sync {
    fn update_positions(&self, object_id: i64, value: i64, positions: Vec<PositionInfo>);
    fn all_positions(&self) -> Vec<PositionInfo>;
    fn update_position_from_client(&self, position: PositionInfo);
}

/// Expert and terminal lifecycle notifications.
pub trait ExpertLifecycle: Send + Sync {
    fn deinit_expert(&self, expert: &ExpertInfo);
    fn deinit_terminal(&self, expert: &ExpertInfo);
}

/// Price levels per symbol, as JSON text.
pub trait LevelsProvider: Send + Sync {
    fn levels_for_symbol(&self, symbol: &str) -> String;
}
