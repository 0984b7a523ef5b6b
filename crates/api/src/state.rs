use sighub_core::{FxFeed, LevelsProvider, LogSink, PositionTracker, Store};
use sighub_engine::{AccountLedger, DealIngestor, PerformanceAggregator, RateCache};
use sighub_metatrader::{
    Collaborators, LevelsBook, MemoryLog, SignalDispatcher, SignalQueue, TerminalRegistry,
    DEFAULT_QUEUE_LIMIT,
};
use std::sync::Arc;

use crate::hub::BroadcastHub;

/// Knobs for [`AppState::new`].
#[derive(Clone)]
pub struct HubOptions {
    pub channel_capacity: usize,
    pub log_max_lines: usize,
    /// Cluster signals kept per target object.
    pub queue_limit: usize,
    pub fx: Option<Arc<dyn FxFeed>>,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            log_max_lines: 1000,
            queue_limit: DEFAULT_QUEUE_LIMIT,
            fx: None,
        }
    }
}

/// Shared application state accessible by every session and route handler.
pub struct AppState {
    pub hub: BroadcastHub,
    pub rates: Arc<RateCache>,
    pub deals: Arc<DealIngestor>,
    pub aggregator: Arc<PerformanceAggregator>,
    pub dispatcher: Arc<SignalDispatcher>,
    pub log: Arc<dyn LogSink>,
    pub positions: Arc<dyn PositionTracker>,
    pub levels: Arc<LevelsBook>,
    pub queue: Arc<SignalQueue>,
}

impl AppState {
    /// Wire every service around one store.
    pub fn new(store: Arc<dyn Store>, options: HubOptions) -> Self {
        let rates = Arc::new(RateCache::new(store.clone()));
        let deals = Arc::new(DealIngestor::new(store.clone()));
        let ledger = Arc::new(AccountLedger::new(store.clone()));
        let aggregator = Arc::new(PerformanceAggregator::new(store, rates.clone()));

        let log = Arc::new(MemoryLog::new(options.log_max_lines));
        let registry = Arc::new(TerminalRegistry::new());
        let levels = Arc::new(LevelsBook::new());
        let queue = Arc::new(SignalQueue::with_limit(options.queue_limit));

        let collaborators = Collaborators {
            relay: queue.clone(),
            responder: queue.clone(),
            log: log.clone(),
            positions: registry.clone(),
            experts: registry.clone(),
            levels: levels.clone(),
        };
        let mut dispatcher =
            SignalDispatcher::new(deals.clone(), ledger, rates.clone(), collaborators);
        if let Some(fx) = options.fx {
            dispatcher = dispatcher.with_fx_feed(fx);
        }

        Self {
            hub: BroadcastHub::new(options.channel_capacity),
            rates,
            deals,
            aggregator,
            dispatcher: Arc::new(dispatcher),
            log,
            positions: registry,
            levels,
            queue,
        }
    }

    pub fn levels_for(&self, symbol: &str) -> String {
        self.levels.levels_for_symbol(symbol)
    }
}
