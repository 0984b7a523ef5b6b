//! UI message handling. Every reply is broadcast to all sessions so that
//! every connected viewer sees the same state.

use serde::Deserialize;
use sighub_core::{Broadcaster, Message, MessageType, PositionInfo};
use sighub_engine::time::parse_terminal_time;
use sighub_engine::SeriesEvent;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::hub::BroadcastHub;
use crate::state::AppState;

const SERVER: &str = "Server";

#[derive(Debug, Deserialize)]
struct CapitalRangeRequest {
    #[serde(rename = "WalletId")]
    wallet_id: WalletId,
    from: String,
    to: String,
}

/// Dashboards send the wallet id either as a number or as numeric text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WalletId {
    Num(i64),
    Text(String),
}

impl WalletId {
    fn value(&self) -> Option<i64> {
        match self {
            WalletId::Num(id) => Some(*id),
            WalletId::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Handle one UI message.
pub async fn route_message(state: &Arc<AppState>, message: Message) {
    match message.kind {
        MessageType::FetchLog => {
            reply(&state.hub, MessageType::FetchLog, state.log.all_text());
        }
        MessageType::ClearLog => {
            state.log.clear();
            reply(&state.hub, MessageType::ClearLog, String::new());
        }
        MessageType::WriteLog => {
            state.log.write(&message.payload);
            reply(&state.hub, MessageType::WriteLog, message.payload);
        }
        MessageType::FetchPositions => {
            send_positions(state);
        }
        MessageType::UpdatePosition => {
            match serde_json::from_str::<PositionInfo>(&message.payload) {
                Ok(position) => {
                    state.positions.update_position_from_client(position);
                    send_positions(state);
                }
                Err(e) => warn!(error = %e, "Bad position update"),
            }
        }
        MessageType::FetchPerformance => {
            let Ok(month_index) = message.payload.trim().parse::<u32>() else {
                warn!(payload = %message.payload, "Bad month index");
                return;
            };
            reply(&state.hub, MessageType::FetchPerformance, "[]".to_string());
            start_performance(state, month_index);
        }
        MessageType::FetchCapitalRange => {
            fetch_capital_range(state, &message.payload).await;
        }
        MessageType::FetchLevels => {
            let levels = state.levels_for(message.payload.trim());
            reply(&state.hub, MessageType::FetchLevels, levels);
        }
        other => {
            warn!(kind = ?other, from = %message.from, "Undefined message");
        }
    }
}

fn reply(hub: &BroadcastHub, kind: MessageType, payload: String) {
    match Message::new(kind, SERVER, payload).to_text() {
        Ok(text) => {
            let sessions = hub.multicast_text(text);
            debug!(kind = ?kind, sessions, "Message broadcast");
        }
        Err(e) => error!(kind = ?kind, error = %e, "Failed to encode message"),
    }
}

fn send_positions(state: &AppState) {
    match serde_json::to_string(&state.positions.all_positions()) {
        Ok(json) => reply(&state.hub, MessageType::FetchPositions, json),
        Err(e) => error!(error = %e, "Failed to encode positions"),
    }
}

/// Stream the series on a detached task, forwarding each point as it comes.
fn start_performance(state: &Arc<AppState>, month_index: u32) {
    let mut stream = state.aggregator.clone().start_series(month_index);
    let hub = state.hub.clone();
    tokio::spawn(async move {
        while let Some(event) = stream.events.recv().await {
            match event {
                SeriesEvent::Point(point) => match serde_json::to_string(&point) {
                    Ok(json) => reply(&hub, MessageType::ChartValue, json),
                    Err(e) => error!(error = %e, "Failed to encode series point"),
                },
                SeriesEvent::Done => reply(&hub, MessageType::ChartDone, String::new()),
            }
        }
        if let Err(e) = stream.handle.await {
            error!(month_index, error = %e, "Performance series task failed");
        }
    });
}

async fn fetch_capital_range(state: &AppState, payload: &str) {
    let request = match serde_json::from_str::<CapitalRangeRequest>(payload) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Bad capital range request");
            return;
        }
    };
    let Some(wallet_id) = request.wallet_id.value() else {
        warn!(wallet_id = ?request.wallet_id, "Bad wallet id");
        return;
    };
    let (Some(from), Some(to)) = (
        parse_terminal_time(&request.from),
        parse_terminal_time(&request.to),
    ) else {
        warn!(from = %request.from, to = %request.to, "Bad capital range dates");
        return;
    };

    match state
        .aggregator
        .capital_range(wallet_id, from.date(), to.date())
        .await
    {
        Ok(points) => {
            info!(wallet_id, points = points.len(), "Capital range built");
            match serde_json::to_string(&points) {
                Ok(json) => reply(&state.hub, MessageType::FetchCapitalRange, json),
                Err(e) => error!(error = %e, "Failed to encode capital range"),
            }
        }
        Err(e) => error!(wallet_id, error = %e, "Capital range failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::HubOptions;
    use sighub_data::MemoryStore;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(Arc::new(MemoryStore::new()), HubOptions::default()))
    }

    async fn next_message(rx: &mut tokio::sync::broadcast::Receiver<String>) -> Message {
        serde_json::from_str(&rx.recv().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_log_messages_are_broadcast() {
        let state = state();
        let mut rx = state.hub.subscribe();

        route_message(&state, Message::new(MessageType::WriteLog, "ui", "hello")).await;
        let echoed = next_message(&mut rx).await;
        assert_eq!(echoed.kind, MessageType::WriteLog);
        assert_eq!(echoed.from, "Server");

        route_message(&state, Message::new(MessageType::FetchLog, "ui", "")).await;
        assert!(next_message(&mut rx).await.payload.ends_with("hello"));

        route_message(&state, Message::new(MessageType::ClearLog, "ui", "")).await;
        assert_eq!(next_message(&mut rx).await.kind, MessageType::ClearLog);
        assert_eq!(state.log.all_text(), "");
    }

    #[tokio::test]
    async fn test_levels_default_reply() {
        let state = state();
        let mut rx = state.hub.subscribe();
        route_message(&state, Message::new(MessageType::FetchLevels, "ui", "EURUSD")).await;
        let reply = next_message(&mut rx).await;
        assert_eq!(reply.kind, MessageType::FetchLevels);
        assert_eq!(reply.payload, "[]");
    }

    #[tokio::test]
    async fn test_performance_reply_then_stream() {
        let state = state();
        let mut rx = state.hub.subscribe();
        route_message(&state, Message::new(MessageType::FetchPerformance, "ui", "0")).await;

        let first = next_message(&mut rx).await;
        assert_eq!(first.kind, MessageType::FetchPerformance);
        assert_eq!(first.payload, "[]");

        loop {
            let next = next_message(&mut rx).await;
            if next.kind == MessageType::ChartDone {
                break;
            }
            assert_eq!(next.kind, MessageType::ChartValue);
        }
    }

    #[tokio::test]
    async fn test_unknown_and_bad_payloads_send_nothing() {
        let state = state();
        let mut rx = state.hub.subscribe();
        route_message(&state, Message::new(MessageType::Unknown(77), "ui", "")).await;
        route_message(&state, Message::new(MessageType::FetchPerformance, "ui", "march")).await;
        route_message(&state, Message::new(MessageType::FetchCapitalRange, "ui", "{}")).await;
        route_message(&state, Message::new(MessageType::UpdatePosition, "ui", "nope")).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_capital_range_reply() {
        let state = state();
        let mut rx = state.hub.subscribe();
        let payload = r#"{"WalletId":1,"from":"2024-03-01","to":"2024-03-03"}"#;
        route_message(&state, Message::new(MessageType::FetchCapitalRange, "ui", payload)).await;

        let reply = next_message(&mut rx).await;
        assert_eq!(reply.kind, MessageType::FetchCapitalRange);
        let points: Vec<serde_json::Value> = serde_json::from_str(&reply.payload).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0]["Date"], "2024-03-01");
    }

    #[tokio::test]
    async fn test_capital_range_accepts_text_wallet_id() {
        let state = state();
        let mut rx = state.hub.subscribe();
        let payload = r#"{"WalletId":"1","from":"2024-03-01","to":"2024-03-03"}"#;
        route_message(&state, Message::new(MessageType::FetchCapitalRange, "ui", payload)).await;

        let reply = next_message(&mut rx).await;
        assert_eq!(reply.kind, MessageType::FetchCapitalRange);
        let points: Vec<serde_json::Value> = serde_json::from_str(&reply.payload).unwrap();
        assert_eq!(points.len(), 3);

        let bad = r#"{"WalletId":"main","from":"2024-03-01","to":"2024-03-03"}"#;
        route_message(&state, Message::new(MessageType::FetchCapitalRange, "ui", bad)).await;
        assert!(rx.try_recv().is_err());
    }
}
