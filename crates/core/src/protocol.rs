//! Wire model shared by terminals, UI clients and the hub.
//!
//! Both envelopes are JSON objects with PascalCase keys. The `Data` of a
//! [`Signal`] and the `Message` of a [`Message`] carry nested JSON whose
//! schema depends on the discriminator (`Id` / `Type`).

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Errors raised while decoding frames or payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Frame decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Payload error for {kind}: {message}")]
    Payload { kind: String, message: String },
}

// ---------------------------------------------------------------------------
// Signal kinds & flags
// ---------------------------------------------------------------------------

/// Signal discriminator. Unknown ids are kept verbatim so they can be
/// relayed opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum SignalKind {
    PostLog,
    CheckHealth,
    DealsHistory,
    CheckBalance,
    UpdateRates,
    ActiveOrders,
    DeinitExpert,
    DeinitTerminal,
    LevelsForSymbol,
    WarnNews,
    Unclassified(i64),
}

impl From<i64> for SignalKind {
    fn from(id: i64) -> Self {
        match id {
            1 => SignalKind::PostLog,
            2 => SignalKind::CheckHealth,
            3 => SignalKind::DealsHistory,
            4 => SignalKind::CheckBalance,
            5 => SignalKind::UpdateRates,
            6 => SignalKind::ActiveOrders,
            7 => SignalKind::DeinitExpert,
            8 => SignalKind::DeinitTerminal,
            9 => SignalKind::LevelsForSymbol,
            10 => SignalKind::WarnNews,
            other => SignalKind::Unclassified(other),
        }
    }
}

impl From<SignalKind> for i64 {
    fn from(kind: SignalKind) -> Self {
        match kind {
            SignalKind::PostLog => 1,
            SignalKind::CheckHealth => 2,
            SignalKind::DealsHistory => 3,
            SignalKind::CheckBalance => 4,
            SignalKind::UpdateRates => 5,
            SignalKind::ActiveOrders => 6,
            SignalKind::DeinitExpert => 7,
            SignalKind::DeinitTerminal => 8,
            SignalKind::LevelsForSymbol => 9,
            SignalKind::WarnNews => 10,
            SignalKind::Unclassified(other) => other,
        }
    }
}

/// Routing scope of a signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum SignalFlags {
    /// Server-to-server traffic; bypasses kind-based handling.
    Cluster,
    /// Ordinary terminal traffic addressed to one expert.
    #[default]
    Targeted,
    Other(i64),
}

impl From<i64> for SignalFlags {
    fn from(raw: i64) -> Self {
        match raw {
            1 => SignalFlags::Cluster,
            2 => SignalFlags::Targeted,
            other => SignalFlags::Other(other),
        }
    }
}

impl From<SignalFlags> for i64 {
    fn from(flags: SignalFlags) -> Self {
        match flags {
            SignalFlags::Cluster => 1,
            SignalFlags::Targeted => 2,
            SignalFlags::Other(other) => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// A typed event exchanged between a terminal and the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Signal {
    pub id: SignalKind,
    #[serde(default)]
    pub flags: SignalFlags,
    #[serde(default)]
    pub object_id: i64,
    #[serde(default)]
    pub chart_id: i64,
    #[serde(default)]
    pub value: i64,
    #[serde(rename = "Sym", default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Signal {
    pub fn new(id: SignalKind, flags: SignalFlags, object_id: i64, chart_id: i64) -> Self {
        Self {
            id,
            flags,
            object_id,
            chart_id,
            value: 0,
            symbol: None,
            data: None,
        }
    }

    /// A targeted reply addressed to the same expert and chart.
    pub fn reply_to(&self) -> Self {
        Signal::new(self.id, SignalFlags::Targeted, self.object_id, self.chart_id)
    }

    pub fn is_cluster(&self) -> bool {
        self.flags == SignalFlags::Cluster
    }

    /// Decode `data` into the schema implied by the caller's kind check.
    ///
    /// Terminals send the payload either inline or as a JSON-encoded string;
    /// both forms are accepted. Absent or `null` data yields `Ok(None)`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<Option<T>, ProtocolError> {
        let data = match &self.data {
            None | Some(serde_json::Value::Null) => return Ok(None),
            Some(data) => data,
        };
        let decoded = match data {
            serde_json::Value::String(text) => serde_json::from_str(text),
            other => T::deserialize(other),
        };
        decoded.map(Some).map_err(|e| ProtocolError::Payload {
            kind: format!("{:?}", self.id),
            message: e.to_string(),
        })
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// UI messages
// ---------------------------------------------------------------------------

/// Discriminator of UI-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum MessageType {
    FetchLog,
    ClearLog,
    WriteLog,
    FetchPositions,
    FetchPerformance,
    FetchCapitalRange,
    UpdatePosition,
    FetchLevels,
    /// One streamed performance point.
    ChartValue,
    /// End of a performance stream.
    ChartDone,
    Unknown(i64),
}

impl From<i64> for MessageType {
    fn from(raw: i64) -> Self {
        match raw {
            1 => MessageType::FetchLog,
            2 => MessageType::ClearLog,
            3 => MessageType::WriteLog,
            4 => MessageType::FetchPositions,
            5 => MessageType::FetchPerformance,
            6 => MessageType::FetchCapitalRange,
            7 => MessageType::UpdatePosition,
            8 => MessageType::FetchLevels,
            9 => MessageType::ChartValue,
            10 => MessageType::ChartDone,
            other => MessageType::Unknown(other),
        }
    }
}

impl From<MessageType> for i64 {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::FetchLog => 1,
            MessageType::ClearLog => 2,
            MessageType::WriteLog => 3,
            MessageType::FetchPositions => 4,
            MessageType::FetchPerformance => 5,
            MessageType::FetchCapitalRange => 6,
            MessageType::UpdatePosition => 7,
            MessageType::FetchLevels => 8,
            MessageType::ChartValue => 9,
            MessageType::ChartDone => 10,
            MessageType::Unknown(other) => other,
        }
    }
}

/// Session-addressed text envelope used by UI clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    #[serde(rename = "Type")]
    pub kind: MessageType,
    #[serde(default)]
    pub from: String,
    #[serde(rename = "Message", default)]
    pub payload: String,
}

impl Message {
    pub fn new(kind: MessageType, from: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind,
            from: from.into(),
            payload: payload.into(),
        }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A decoded inbound text frame.
///
/// Signals are recognised by their `Id` key, UI messages by `Type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Signal(Signal),
    Message(Message),
}

impl Frame {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

// ---------------------------------------------------------------------------
// Payload schemas
// ---------------------------------------------------------------------------

/// One history record reported by a terminal (deals-history payload).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DealInfo {
    pub ticket: i64,
    pub order_id: i64,
    pub account: i64,
    pub magic: i64,
    pub symbol: String,
    #[serde(rename = "Type")]
    pub kind: i32,
    pub lots: Decimal,
    pub open_price: Decimal,
    pub close_price: Decimal,
    pub open_time: String,
    pub close_time: String,
    pub profit: Decimal,
    pub commission: Decimal,
    pub swap_value: Decimal,
    pub comment: Option<String>,
}

/// One quote of a rate-update payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RateInfo {
    pub symbol: String,
    #[serde(default)]
    pub bid: Decimal,
    #[serde(default)]
    pub ask: Decimal,
}

/// Element of a balance-check payload; missing numbers read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BalanceInfo {
    pub account: i64,
    pub balance: Decimal,
    pub equity: Decimal,
}

/// An open position as reported by a terminal or edited by a UI client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PositionInfo {
    pub ticket: i64,
    pub account: i64,
    pub magic: i64,
    pub symbol: String,
    #[serde(rename = "Type")]
    pub kind: i32,
    pub lots: Decimal,
    pub open_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub profit: Decimal,
    pub open_time: String,
}

/// Expert descriptor carried by the deinit signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExpertInfo {
    pub account: i64,
    pub magic: i64,
    pub chart_id: i64,
    pub symbol: String,
    #[serde(rename = "EAName")]
    pub ea_name: String,
}
