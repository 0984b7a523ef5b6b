use chrono::NaiveDate;
use sighub_core::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::time::parse_terminal_time;

/// Outcome of one ingestion batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub unknown_symbol: usize,
    pub failed: usize,
}

/// Lookups resolved once per batch while the ingestion lock is held.
struct BatchContext {
    symbols: HashMap<String, i64>,
    terminals: HashMap<i64, i64>,
    /// Tickets saved earlier in the same batch.
    saved: HashSet<i64>,
}

/// Deduplicating, ordered persistence of terminal deal history.
///
/// All batches, from every connection, go through one named mutex so that
/// the existence check and the insert of a deal id can never interleave with
/// another batch carrying the same id.
pub struct DealIngestor {
    store: Arc<dyn Store>,
    ingest_lock: Mutex<()>,
}

impl DealIngestor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            ingest_lock: Mutex::new(()),
        }
    }

    /// Persist every deal not seen before, oldest close time first.
    ///
    /// Deals on unknown symbols and already stored ids are skipped; a
    /// failing record is logged and does not stop the rest of the batch.
    pub async fn ingest(&self, mut deals: Vec<DealInfo>) -> IngestReport {
        let mut report = IngestReport::default();
        if deals.is_empty() {
            return report;
        }

        let guard = self.ingest_lock.lock().await;

        deals.sort_by_cached_key(|d| (parse_terminal_time(&d.close_time), d.close_time.clone()));

        let mut ctx = match self.batch_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(error = %e, deals = deals.len(), "Failed to prepare deal ingestion");
                report.failed = deals.len();
                return report;
            }
        };

        for deal in &deals {
            match self.ingest_one(&mut ctx, deal).await {
                Ok(Outcome::Inserted) => report.inserted += 1,
                Ok(Outcome::Duplicate) => report.duplicates += 1,
                Ok(Outcome::UnknownSymbol) => report.unknown_symbol += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        deal_id = deal.ticket,
                        symbol = %deal.symbol,
                        error = %e,
                        "Deal failed to be saved"
                    );
                }
            }
        }

        drop(guard);

        if report.inserted > 0 {
            info!(count = report.inserted, "Saved history deals");
        }
        report
    }

    async fn batch_context(&self) -> Result<BatchContext, StoreError> {
        let symbols = self
            .store
            .list_records::<Symbol>()
            .await?
            .into_iter()
            .map(|s| (s.name, s.id))
            .collect();
        let terminals = self
            .store
            .list_records::<Terminal>()
            .await?
            .into_iter()
            .map(|t| (t.account_number, t.id))
            .collect();
        Ok(BatchContext {
            symbols,
            terminals,
            saved: HashSet::new(),
        })
    }

    async fn ingest_one(&self, ctx: &mut BatchContext, info: &DealInfo) -> Result<Outcome, StoreError> {
        let Some(&symbol_id) = ctx.symbols.get(&info.symbol) else {
            debug!(deal_id = info.ticket, symbol = %info.symbol, "Unknown symbol, deal skipped");
            return Ok(Outcome::UnknownSymbol);
        };

        if info.ticket <= 0 {
            return Err(StoreError::Database(format!("invalid ticket {}", info.ticket)));
        }

        // Stored deals are keyed by ticket.
        if ctx.saved.contains(&info.ticket)
            || self.store.get(EntityKind::Deal, info.ticket).await?.is_some()
        {
            return Ok(Outcome::Duplicate);
        }

        let adviser_id = self.resolve_adviser(info.magic).await;
        let deal = Deal {
            id: info.ticket,
            deal_id: info.ticket,
            order_id: info.order_id,
            symbol_id,
            terminal_id: ctx.terminals.get(&info.account).copied(),
            adviser_id,
            open_time: parse_terminal_time(&info.open_time),
            close_time: parse_terminal_time(&info.close_time),
            profit: info.profit,
            commission: info.commission,
            swap: info.swap_value,
            volume: info.lots,
            price: info.close_price,
            comment: info.comment.clone(),
            kind: info.kind,
        };

        self.store.insert_record(deal).await?;
        ctx.saved.insert(info.ticket);
        Ok(Outcome::Inserted)
    }

    async fn resolve_adviser(&self, magic: i64) -> Option<i64> {
        if magic <= 0 {
            return None;
        }
        match self.store.get_record::<Adviser>(magic).await {
            Ok(adviser) => adviser.map(|a| a.id),
            Err(e) => {
                warn!(magic, error = %e, "Adviser lookup failed");
                None
            }
        }
    }

    /// Stored deals, most recently closed first.
    pub async fn history(&self) -> Result<Vec<Deal>, StoreError> {
        let mut deals = self.store.list_records::<Deal>().await?;
        deals.sort_by(|a, b| b.close_time.cmp(&a.close_time));
        Ok(deals)
    }

    /// Deals closed on the given calendar day, most recent first.
    pub async fn closed_on(&self, day: NaiveDate) -> Result<Vec<Deal>, StoreError> {
        Ok(self
            .history()
            .await?
            .into_iter()
            .filter(|d| d.close_time.map(|t| t.date()) == Some(day))
            .collect())
    }
}

enum Outcome {
    Inserted,
    Duplicate,
    UnknownSymbol,
}
