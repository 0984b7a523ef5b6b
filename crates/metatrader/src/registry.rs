//! In-process state the dispatcher and gateway share about live terminals.

use async_trait::async_trait;
use dashmap::DashMap;
use sighub_core::*;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Terminal key: the reporting object id and the signal value it sent.
type TerminalKey = (i64, i64);

/// Open positions per terminal.
#[derive(Default)]
pub struct TerminalRegistry {
    positions: DashMap<TerminalKey, Vec<PositionInfo>>,
}

impl TerminalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn terminal_count(&self) -> usize {
        self.positions.len()
    }

    fn remove_where(&self, pred: impl Fn(&PositionInfo) -> bool) -> usize {
        let mut removed = 0;
        for mut entry in self.positions.iter_mut() {
            let before = entry.len();
            entry.retain(|p| !pred(p));
            removed += before - entry.len();
        }
        self.positions.retain(|_, list| !list.is_empty());
        removed
    }
}

impl PositionTracker for TerminalRegistry {
    fn update_positions(&self, object_id: i64, value: i64, positions: Vec<PositionInfo>) {
        debug!(object_id, value, count = positions.len(), "Positions updated");
        if positions.is_empty() {
            self.positions.remove(&(object_id, value));
        } else {
            self.positions.insert((object_id, value), positions);
        }
    }

    fn all_positions(&self) -> Vec<PositionInfo> {
        let mut all: Vec<PositionInfo> = self
            .positions
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|p| p.ticket);
        all
    }

    fn update_position_from_client(&self, position: PositionInfo) {
        for mut entry in self.positions.iter_mut() {
            if let Some(slot) = entry.iter_mut().find(|p| p.ticket == position.ticket) {
                slot.stop_loss = position.stop_loss;
                slot.take_profit = position.take_profit;
                info!(ticket = position.ticket, "Position updated from client");
                return;
            }
        }
        warn!(ticket = position.ticket, "Client update for unknown position");
    }
}

impl ExpertLifecycle for TerminalRegistry {
    fn deinit_expert(&self, expert: &ExpertInfo) {
        let removed =
            self.remove_where(|p| p.account == expert.account && p.magic == expert.magic);
        info!(
            account = expert.account,
            magic = expert.magic,
            expert = %expert.ea_name,
            removed,
            "Expert deinitialized"
        );
    }

    fn deinit_terminal(&self, expert: &ExpertInfo) {
        let removed = self.remove_where(|p| p.account == expert.account);
        info!(account = expert.account, removed, "Terminal deinitialized");
    }
}

/// Price levels per symbol, stored as JSON text.
#[derive(Default)]
pub struct LevelsBook {
    levels: DashMap<String, String>,
}

impl LevelsBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_levels(&self, symbol: impl Into<String>, levels: impl Into<String>) {
        self.levels.insert(symbol.into(), levels.into());
    }
}

impl LevelsProvider for LevelsBook {
    fn levels_for_symbol(&self, symbol: &str) -> String {
        self.levels
            .get(symbol)
            .map(|l| l.value().clone())
            .unwrap_or_else(|| "[]".to_string())
    }
}

/// Signals kept per target object before the oldest are dropped.
pub const DEFAULT_QUEUE_LIMIT: usize = 1000;

/// Signals relayed between servers, queued per target object.
///
/// Doubles as the default reply producer for unclassified signals, which
/// are echoed back to their sender.
pub struct SignalQueue {
    queues: DashMap<i64, VecDeque<Signal>>,
    limit: usize,
}

impl Default for SignalQueue {
    fn default() -> Self {
        Self::with_limit(DEFAULT_QUEUE_LIMIT)
    }
}

impl SignalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            queues: DashMap::new(),
            limit: limit.max(1),
        }
    }

    /// Pop the oldest queued signal for `object_id` carrying `flags`.
    pub fn listen(&self, flags: SignalFlags, object_id: i64) -> Option<Signal> {
        let signal = {
            let mut queue = self.queues.get_mut(&object_id)?;
            let idx = queue.iter().position(|s| s.flags == flags)?;
            queue.remove(idx)
        };
        self.queues.remove_if(&object_id, |_, queue| queue.is_empty());
        signal
    }

    pub fn pending(&self, object_id: i64) -> usize {
        self.queues.get(&object_id).map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ClusterRelay for SignalQueue {
    async fn post_signal(&self, signal: Signal) {
        debug!(object_id = signal.object_id, id = ?signal.id, "Signal queued");
        let object_id = signal.object_id;
        let mut queue = self.queues.entry(object_id).or_default();
        queue.push_back(signal);
        if queue.len() > self.limit {
            if let Some(dropped) = queue.pop_front() {
                warn!(
                    object_id,
                    id = ?dropped.id,
                    limit = self.limit,
                    "Signal queue full, dropped oldest"
                );
            }
        }
    }
}

#[async_trait]
impl SignalResponder for SignalQueue {
    async fn respond(&self, signal: &Signal) -> Option<Signal> {
        let mut reply = signal.reply_to();
        reply.value = signal.value;
        reply.symbol = signal.symbol.clone();
        reply.data = signal.data.clone();
        Some(reply)
    }
}
