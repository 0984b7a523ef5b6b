use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

/// Every record type the persistence collaborator knows about.
///
/// The set is closed: adding a kind means adding a variant here, a variant to
/// [`Entity`] and a [`Record`] impl, all checked at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Symbol,
    Rate,
    Deal,
    Terminal,
    Account,
    AccountState,
    Adviser,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Symbol,
        EntityKind::Rate,
        EntityKind::Deal,
        EntityKind::Terminal,
        EntityKind::Account,
        EntityKind::AccountState,
        EntityKind::Adviser,
    ];

    /// Stable name used as the storage discriminator.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Symbol => "symbol",
            EntityKind::Rate => "rate",
            EntityKind::Deal => "deal",
            EntityKind::Terminal => "terminal",
            EntityKind::Account => "account",
            EntityKind::AccountState => "account_state",
            EntityKind::Adviser => "adviser",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Instruments & Rates
// ---------------------------------------------------------------------------

/// A tradeable symbol as named by the terminals (e.g. EURUSD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub retired: bool,
}

/// Persisted bid/ask pair for a currency pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    pub id: i64,
    /// Pair name, e.g. `EURUSD`.
    pub symbol: String,
    /// Base currency.
    pub c1: String,
    /// Quote currency.
    pub c2: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last_update: Option<NaiveDateTime>,
    pub retired: bool,
}

/// In-memory view of a [`Rate`] held by the rate cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last_update: Option<NaiveDateTime>,
    pub retired: bool,
}

impl From<&Rate> for Quote {
    fn from(rate: &Rate) -> Self {
        Self {
            symbol: rate.symbol.clone(),
            bid: rate.bid,
            ask: rate.ask,
            last_update: rate.last_update,
            retired: rate.retired,
        }
    }
}

// ---------------------------------------------------------------------------
// Terminals, Accounts, Advisers
// ---------------------------------------------------------------------------

/// A trading terminal bound to one broker account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Terminal {
    pub id: i64,
    /// Broker-side account number reported by the terminal.
    pub account_number: i64,
    /// Owning account record, if linked.
    pub account_id: Option<i64>,
    pub broker: String,
    pub demo: bool,
    pub retired: bool,
}

/// A money account tracked by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub number: i64,
    /// ISO currency code the balance is denominated in.
    pub currency: String,
    /// Account type; anything above zero counts as an investment account.
    pub kind: i32,
    pub wallet_id: Option<i64>,
    pub balance: Decimal,
    pub equity: Decimal,
    pub last_update: Option<NaiveDateTime>,
    pub retired: bool,
}

impl Account {
    pub fn is_investing(&self) -> bool {
        self.kind > 0
    }
}

/// Daily balance snapshot. At most one per account per calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub id: i64,
    pub account_id: i64,
    /// Local wall-clock time of the last write.
    pub date: NaiveDateTime,
    pub balance: Decimal,
    pub comment: Option<String>,
}

/// An expert advisor instance; its id is the magic number it trades with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adviser {
    pub id: i64,
    pub name: String,
    pub terminal_id: Option<i64>,
    pub symbol_id: Option<i64>,
    pub retired: bool,
}

// ---------------------------------------------------------------------------
// Deals
// ---------------------------------------------------------------------------

/// A closed trade. Immutable once persisted; `id` is the broker ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: i64,
    pub deal_id: i64,
    pub order_id: i64,
    pub symbol_id: i64,
    pub terminal_id: Option<i64>,
    pub adviser_id: Option<i64>,
    pub open_time: Option<NaiveDateTime>,
    pub close_time: Option<NaiveDateTime>,
    pub profit: Decimal,
    pub commission: Decimal,
    pub swap: Decimal,
    pub volume: Decimal,
    pub price: Decimal,
    pub comment: Option<String>,
    /// Deal type as reported by the terminal (buy/sell/balance...).
    pub kind: i32,
}

// ---------------------------------------------------------------------------
// Entity envelope
// ---------------------------------------------------------------------------

/// A record of any persisted kind, tagged by its [`EntityKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Entity {
    Symbol(Symbol),
    Rate(Rate),
    Deal(Deal),
    Terminal(Terminal),
    Account(Account),
    AccountState(AccountState),
    Adviser(Adviser),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Symbol(_) => EntityKind::Symbol,
            Entity::Rate(_) => EntityKind::Rate,
            Entity::Deal(_) => EntityKind::Deal,
            Entity::Terminal(_) => EntityKind::Terminal,
            Entity::Account(_) => EntityKind::Account,
            Entity::AccountState(_) => EntityKind::AccountState,
            Entity::Adviser(_) => EntityKind::Adviser,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Entity::Symbol(r) => r.id,
            Entity::Rate(r) => r.id,
            Entity::Deal(r) => r.id,
            Entity::Terminal(r) => r.id,
            Entity::Account(r) => r.id,
            Entity::AccountState(r) => r.id,
            Entity::Adviser(r) => r.id,
        }
    }

    pub fn set_id(&mut self, id: i64) {
        match self {
            Entity::Symbol(r) => r.id = id,
            Entity::Rate(r) => r.id = id,
            Entity::Deal(r) => r.id = id,
            Entity::Terminal(r) => r.id = id,
            Entity::Account(r) => r.id = id,
            Entity::AccountState(r) => r.id = id,
            Entity::Adviser(r) => r.id = id,
        }
    }

    /// Serialize only the inner record (the kind is stored separately).
    pub fn body(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Entity::Symbol(r) => serde_json::to_value(r),
            Entity::Rate(r) => serde_json::to_value(r),
            Entity::Deal(r) => serde_json::to_value(r),
            Entity::Terminal(r) => serde_json::to_value(r),
            Entity::Account(r) => serde_json::to_value(r),
            Entity::AccountState(r) => serde_json::to_value(r),
            Entity::Adviser(r) => serde_json::to_value(r),
        }
    }

    /// Rebuild an entity from a stored kind and body.
    pub fn from_body(kind: EntityKind, body: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            EntityKind::Symbol => Entity::Symbol(serde_json::from_value(body)?),
            EntityKind::Rate => Entity::Rate(serde_json::from_value(body)?),
            EntityKind::Deal => Entity::Deal(serde_json::from_value(body)?),
            EntityKind::Terminal => Entity::Terminal(serde_json::from_value(body)?),
            EntityKind::Account => Entity::Account(serde_json::from_value(body)?),
            EntityKind::AccountState => Entity::AccountState(serde_json::from_value(body)?),
            EntityKind::Adviser => Entity::Adviser(serde_json::from_value(body)?),
        })
    }
}

/// Compile-time link between a record type and its [`EntityKind`].
pub trait Record: Sized + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> i64;
    fn into_entity(self) -> Entity;
    fn from_entity(entity: Entity) -> Option<Self>;
}

macro_rules! impl_record {
    ($ty:ident) => {
        impl Record for $ty {
            const KIND: EntityKind = EntityKind::$ty;

            fn id(&self) -> i64 {
                self.id
            }

            fn into_entity(self) -> Entity {
                Entity::$ty(self)
            }

            fn from_entity(entity: Entity) -> Option<Self> {
                match entity {
                    Entity::$ty(record) => Some(record),
                    _ => None,
                }
            }
        }
    };
}

impl_record!(Symbol);
impl_record!(Rate);
impl_record!(Deal);
impl_record!(Terminal);
impl_record!(Account);
impl_record!(AccountState);
impl_record!(Adviser);

// ---------------------------------------------------------------------------
// Derived series
// ---------------------------------------------------------------------------

/// Aggregation period of a [`TimeStat`] point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimePeriod {
    Daily,
}

/// One point of the account-equity time series. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimeStat {
    /// Day of month the point belongs to.
    #[serde(rename = "X")]
    pub day_index: u32,
    pub date: NaiveDate,
    pub period: TimePeriod,
    pub checking_value: Decimal,
    pub checking_change: Decimal,
    pub investing_value: Decimal,
    pub investing_change: Decimal,
    pub gains: Decimal,
    pub losses: Decimal,
}

impl TimeStat {
    pub fn new(day_index: u32, date: NaiveDate, period: TimePeriod) -> Self {
        Self {
            day_index,
            date,
            period,
            checking_value: Decimal::ZERO,
            checking_change: Decimal::ZERO,
            investing_value: Decimal::ZERO,
            investing_change: Decimal::ZERO,
            gains: Decimal::ZERO,
            losses: Decimal::ZERO,
        }
    }
}

/// One day of a wallet's capital history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CapitalPoint {
    pub date: NaiveDate,
    pub balance: Decimal,
}
