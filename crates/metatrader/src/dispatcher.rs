use rust_decimal::Decimal;
use sighub_core::*;
use sighub_engine::{AccountLedger, DealIngestor, RateCache};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Errors raised inside a dispatch branch. They never leave
/// [`SignalDispatcher::dispatch`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// In-process collaborators the dispatcher hands signals to.
#[derive(Clone)]
pub struct Collaborators {
    pub relay: Arc<dyn ClusterRelay>,
    pub responder: Arc<dyn SignalResponder>,
    pub log: Arc<dyn LogSink>,
    pub positions: Arc<dyn PositionTracker>,
    pub experts: Arc<dyn ExpertLifecycle>,
    pub levels: Arc<dyn LevelsProvider>,
}

/// Routes each inbound terminal signal to the service that owns it.
///
/// Holds no per-signal state; concurrent dispatches from different sessions
/// are independent.
pub struct SignalDispatcher {
    deals: Arc<DealIngestor>,
    ledger: Arc<AccountLedger>,
    rates: Arc<RateCache>,
    fx: Option<Arc<dyn FxFeed>>,
    collaborators: Collaborators,
}

impl SignalDispatcher {
    pub fn new(
        deals: Arc<DealIngestor>,
        ledger: Arc<AccountLedger>,
        rates: Arc<RateCache>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            deals,
            ledger,
            rates,
            fx: None,
            collaborators,
        }
    }

    /// Append the feed's rate to every rate update.
    pub fn with_fx_feed(mut self, feed: Arc<dyn FxFeed>) -> Self {
        self.fx = Some(feed);
        self
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Handle one signal. Failures are logged, never returned.
    pub async fn dispatch(&self, signal: Signal, broadcaster: Option<&dyn Broadcaster>) {
        if signal.is_cluster() {
            self.collaborators.relay.post_signal(signal).await;
            return;
        }

        let id = signal.id;
        let object_id = signal.object_id;
        if let Err(e) = self.handle(signal, broadcaster).await {
            error!(id = ?id, object_id, error = %e, "Signal handling failed");
        }
    }

    async fn handle(
        &self,
        signal: Signal,
        broadcaster: Option<&dyn Broadcaster>,
    ) -> Result<(), DispatchError> {
        match signal.id {
            SignalKind::PostLog => {
                if signal.data.is_some() {
                    self.collaborators.log.post_signal_log(&signal);
                }
            }
            SignalKind::CheckHealth => {
                debug!(object_id = signal.object_id, value = signal.value, "Health check");
            }
            SignalKind::DealsHistory => {
                let deals = signal.payload::<Vec<DealInfo>>()?.unwrap_or_default();
                let report = self.deals.ingest(deals).await;
                debug!(object_id = signal.object_id, ?report, "Deals history processed");
            }
            SignalKind::CheckBalance => {
                let balances = signal.payload::<Vec<BalanceInfo>>()?.unwrap_or_default();
                let Some(first) = balances.into_iter().next() else {
                    warn!(object_id = signal.object_id, "Empty balance payload");
                    return Ok(());
                };
                self.ledger
                    .update_balance(first.account, first.balance, first.equity)
                    .await?;
            }
            SignalKind::UpdateRates => {
                let mut quotes = signal.payload::<Vec<RateInfo>>()?.unwrap_or_default();
                if let Some(extra) = self.fetch_fx_quote().await {
                    quotes.push(extra);
                }
                self.rates.apply_rate_update(&quotes).await;
            }
            SignalKind::ActiveOrders => {
                let positions = signal.payload::<Vec<PositionInfo>>()?.unwrap_or_default();
                self.collaborators
                    .positions
                    .update_positions(signal.object_id, signal.value, positions);
            }
            SignalKind::DeinitExpert => {
                if let Some(expert) = self.expert(&signal)? {
                    self.collaborators.experts.deinit_expert(&expert);
                }
            }
            SignalKind::DeinitTerminal => {
                if let Some(expert) = self.expert(&signal)? {
                    self.collaborators.experts.deinit_terminal(&expert);
                }
            }
            SignalKind::LevelsForSymbol => {
                let symbol = signal.symbol.clone().unwrap_or_default();
                let levels = self.collaborators.levels.levels_for_symbol(&symbol);
                let mut reply = signal.reply_to();
                reply.symbol = Some(symbol);
                reply.data = Some(serde_json::Value::String(levels));
                self.broadcast(&reply, broadcaster)?;
            }
            SignalKind::WarnNews => {
                debug!(object_id = signal.object_id, "News warning ignored");
            }
            SignalKind::Unclassified(_) => {
                if let Some(reply) = self.collaborators.responder.respond(&signal).await {
                    self.broadcast(&reply, broadcaster)?;
                }
            }
        }
        Ok(())
    }

    fn expert(&self, signal: &Signal) -> Result<Option<ExpertInfo>, DispatchError> {
        let expert = signal.payload::<ExpertInfo>()?;
        if expert.is_none() {
            warn!(id = ?signal.id, object_id = signal.object_id, "Deinit signal without expert");
        }
        Ok(expert)
    }

    /// The supplementary cross rate, when the feed is configured and has one.
    async fn fetch_fx_quote(&self) -> Option<RateInfo> {
        let feed = self.fx.as_ref()?;
        match feed.fetch_rate().await {
            Ok(rate) if rate > Decimal::ZERO => {
                info!(symbol = feed.symbol(), %rate, "Official rate fetched");
                Some(RateInfo {
                    symbol: feed.symbol().to_string(),
                    bid: rate,
                    ask: rate,
                })
            }
            Ok(_) => {
                warn!(symbol = feed.symbol(), "Official rate missing from feed");
                None
            }
            Err(e) => {
                warn!(symbol = feed.symbol(), error = %e, "Official rate fetch failed");
                None
            }
        }
    }

    fn broadcast(
        &self,
        reply: &Signal,
        broadcaster: Option<&dyn Broadcaster>,
    ) -> Result<(), DispatchError> {
        let text = reply.to_text()?;
        match broadcaster {
            Some(b) => {
                let sessions = b.multicast_text(text);
                debug!(id = ?reply.id, sessions, "Reply broadcast");
            }
            None => debug!(id = ?reply.id, "No broadcaster, reply dropped"),
        }
        Ok(())
    }
}
