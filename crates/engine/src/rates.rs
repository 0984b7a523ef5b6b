use arc_swap::ArcSwap;
use chrono::Utc;
use rust_decimal::Decimal;
use sighub_core::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

type QuoteMap = HashMap<String, Quote>;

/// Concurrent symbol-pair → quote cache.
///
/// Readers load the current snapshot without locking; a refresh builds a
/// complete new map and publishes it with a single atomic swap, so a reader
/// sees either the old or the new set of quotes, never a mix.
pub struct RateCache {
    store: Arc<dyn Store>,
    quotes: ArcSwap<QuoteMap>,
    /// Keeps concurrent refreshes from publishing out of order.
    refresh_lock: Mutex<()>,
}

impl RateCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            quotes: ArcSwap::from_pointee(QuoteMap::new()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Reload all non-retired quotes from the store.
    ///
    /// Without `force` this is a no-op once the cache holds entries. On a
    /// store failure the previous contents stay in place.
    pub async fn refresh(&self, force: bool) {
        if !force && !self.is_empty() {
            return;
        }

        let _guard = self.refresh_lock.lock().await;
        match self.load().await {
            Ok(map) => {
                debug!(quotes = map.len(), "Rate cache refreshed");
                self.quotes.store(Arc::new(map));
            }
            Err(e) => {
                error!(error = %e, "Rate cache refresh failed, keeping previous quotes");
            }
        }
    }

    async fn load(&self) -> Result<QuoteMap, StoreError> {
        let rates = self.store.list_records::<Rate>().await?;
        Ok(rates
            .iter()
            .filter(|r| !r.retired)
            .map(|r| (r.symbol.clone(), Quote::from(r)))
            .collect())
    }

    /// Current quote for a pair.
    pub fn get(&self, symbol: &str) -> Option<Quote> {
        self.quotes.load().get(symbol).cloned()
    }

    /// Consistent view of every cached quote.
    #[cfg(test)]
    pub fn snapshot(&self) -> Arc<QuoteMap> {
        self.quotes.load_full()
    }

    pub fn len(&self) -> usize {
        self.quotes.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.load().is_empty()
    }

    /// Convert `amount` in `currency` to USD, best effort.
    ///
    /// Uses `<CUR>USD` bid when present, else divides by `USD<CUR>` ask.
    /// With no usable quote the amount is returned unchanged.
    pub fn convert_to_usd(&self, amount: Decimal, currency: &str) -> Decimal {
        if currency == "USD" || amount.is_zero() {
            return amount;
        }

        let quotes = self.quotes.load();
        let (quote, converted) = if let Some(direct) = quotes.get(&format!("{}USD", currency)) {
            (direct, amount.checked_mul(direct.bid))
        } else if let Some(inverse) = quotes.get(&format!("USD{}", currency)) {
            (inverse, amount.checked_div(inverse.ask))
        } else {
            return amount;
        };

        converted.unwrap_or_else(|| {
            warn!(
                symbol = %quote.symbol,
                bid = %quote.bid,
                ask = %quote.ask,
                %amount,
                "Unusable quote, skipping conversion"
            );
            amount
        })
    }

    /// Write new prices for the persisted pairs named in `updates`, then
    /// republish the whole cache.
    pub async fn apply_rate_update(&self, updates: &[RateInfo]) {
        let rates = match self.store.list_records::<Rate>().await {
            Ok(rates) => rates,
            Err(e) => {
                error!(error = %e, "Failed to load rates for update");
                return;
            }
        };

        let now = Utc::now().naive_utc();
        let mut updated = 0usize;
        for mut rate in rates {
            let Some(incoming) = updates.iter().find(|u| u.symbol == rate.symbol) else {
                continue;
            };
            rate.bid = incoming.bid;
            rate.ask = incoming.ask;
            rate.last_update = Some(now);
            let symbol = rate.symbol.clone();
            match self.store.update_record(rate).await {
                Ok(()) => updated += 1,
                Err(e) => error!(symbol = %symbol, error = %e, "Failed to update rate"),
            }
        }

        if updated > 0 {
            info!(updated, "Rates updated");
        }
        self.refresh(true).await;
    }
}
