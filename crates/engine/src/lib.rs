pub mod accounts;
pub mod deals;
pub mod performance;
pub mod rates;
pub mod time;

#[cfg(test)]
pub(crate) mod testutil;

pub use accounts::AccountLedger;
pub use deals::{DealIngestor, IngestReport};
pub use performance::{PerformanceAggregator, SeriesEvent, SeriesStream};
pub use rates::RateCache;
