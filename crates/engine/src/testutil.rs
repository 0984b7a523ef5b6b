use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use sighub_core::*;
use sighub_data::MemoryStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Memory store that can be switched into failing mode and records the
/// order of inserts.
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    inserts: Mutex<Vec<(EntityKind, i64)>>,
    lists: Mutex<Vec<EntityKind>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(false),
            inserts: Mutex::new(Vec::new()),
            lists: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn seed<T: Record>(&self, record: T) -> i64 {
        self.inner.insert(record.into_entity()).await.unwrap()
    }

    pub fn inserted_ids(&self, kind: EntityKind) -> Vec<i64> {
        self.inserts
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn list_calls(&self, kind: EntityKind) -> usize {
        self.lists.lock().unwrap().iter().filter(|k| **k == kind).count()
    }

    pub async fn count(&self, kind: EntityKind) -> usize {
        self.inner.count(kind).await
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Database("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn get(&self, kind: EntityKind, id: i64) -> Result<Option<Entity>, StoreError> {
        self.check()?;
        self.inner.get(kind, id).await
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>, StoreError> {
        self.check()?;
        self.lists.lock().unwrap().push(kind);
        self.inner.list(kind).await
    }

    async fn insert(&self, entity: Entity) -> Result<i64, StoreError> {
        self.check()?;
        let kind = entity.kind();
        let id = self.inner.insert(entity).await?;
        self.inserts.lock().unwrap().push((kind, id));
        Ok(id)
    }

    async fn update(&self, id: i64, entity: Entity) -> Result<(), StoreError> {
        self.check()?;
        self.inner.update(id, entity).await
    }

    async fn delete(&self, kind: EntityKind, id: i64) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(kind, id).await
    }
}

pub fn rate(id: i64, symbol: &str, bid: Decimal, ask: Decimal) -> Rate {
    Rate {
        id,
        symbol: symbol.to_string(),
        c1: symbol[..3].to_string(),
        c2: symbol[3..].to_string(),
        bid,
        ask,
        last_update: None,
        retired: false,
    }
}

pub fn symbol(id: i64, name: &str) -> Symbol {
    Symbol {
        id,
        name: name.to_string(),
        description: None,
        retired: false,
    }
}

pub fn terminal(id: i64, account_number: i64, account_id: i64, demo: bool) -> Terminal {
    Terminal {
        id,
        account_number,
        account_id: Some(account_id),
        broker: "TestBroker".to_string(),
        demo,
        retired: false,
    }
}

pub fn account(id: i64, currency: &str, kind: i32) -> Account {
    Account {
        id,
        number: 1000 + id,
        currency: currency.to_string(),
        kind,
        wallet_id: None,
        balance: Decimal::ZERO,
        equity: Decimal::ZERO,
        last_update: None,
        retired: false,
    }
}

pub fn state(account_id: i64, date: NaiveDateTime, balance: Decimal) -> AccountState {
    AccountState {
        id: 0,
        account_id,
        date,
        balance,
        comment: None,
    }
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

pub fn deal_info(ticket: i64, symbol: &str, close_time: &str) -> DealInfo {
    DealInfo {
        ticket,
        order_id: ticket * 10,
        account: 1001,
        magic: 0,
        symbol: symbol.to_string(),
        open_time: "2024.03.01 09:00:00".to_string(),
        close_time: close_time.to_string(),
        ..DealInfo::default()
    }
}
