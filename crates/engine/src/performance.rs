use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use sighub_core::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::rates::RateCache;
use crate::time::days_in_month;

/// Snapshots taken after 23:50 belong to the next day's update run.
const DAY_END_MINUTES: i64 = 23 * 60 + 50;

const STREAM_BUFFER: usize = 32;

/// One item of a streamed series.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesEvent {
    Point(TimeStat),
    Done,
}

/// Receiving end of a detached series computation.
pub struct SeriesStream {
    pub events: mpsc::Receiver<SeriesEvent>,
    pub handle: JoinHandle<()>,
}

/// Account snapshots loaded once per series.
struct Snapshots {
    accounts: Vec<Account>,
    states: HashMap<i64, Vec<AccountState>>,
}

impl Snapshots {
    /// Latest snapshot of an account taken at or before `at`.
    fn latest(&self, account_id: i64, at: NaiveDateTime) -> Option<&AccountState> {
        let states = self.states.get(&account_id)?;
        let idx = states.partition_point(|s| s.date <= at);
        idx.checked_sub(1).map(|i| &states[i])
    }
}

/// Builds daily equity series from account snapshots.
pub struct PerformanceAggregator {
    store: Arc<dyn Store>,
    rates: Arc<RateCache>,
}

impl PerformanceAggregator {
    pub fn new(store: Arc<dyn Store>, rates: Arc<RateCache>) -> Self {
        Self { store, rates }
    }

    /// Series for a 0-based month index relative to today.
    ///
    /// Store failures are logged and give an empty series.
    pub async fn build_series(&self, month_index: u32) -> Vec<TimeStat> {
        match self
            .build_series_at(month_index, Local::now().date_naive())
            .await
        {
            Ok(series) => series,
            Err(e) => {
                error!(month_index, error = %e, "Failed to build performance series");
                Vec::new()
            }
        }
    }

    /// Series for a 0-based month index as seen on `today`.
    ///
    /// A month later in the year than today's refers to last year. The
    /// current month stops at today, any other month runs to its last day.
    pub async fn build_series_at(
        &self,
        month_index: u32,
        today: NaiveDate,
    ) -> Result<Vec<TimeStat>, StoreError> {
        let Some(days) = month_days(month_index, today) else {
            warn!(month_index, "Invalid month index");
            return Ok(Vec::new());
        };
        let snapshots = self.load_snapshots().await?;
        Ok(days.iter().map(|day| self.point(&snapshots, *day)).collect())
    }

    /// Compute the series on a detached task, one event per day then `Done`.
    ///
    /// The task stops as soon as the receiver is dropped.
    pub fn start_series(self: Arc<Self>, month_index: u32) -> SeriesStream {
        self.start_series_at(month_index, Local::now().date_naive())
    }

    pub fn start_series_at(self: Arc<Self>, month_index: u32, today: NaiveDate) -> SeriesStream {
        let (tx, events) = mpsc::channel(STREAM_BUFFER);
        let handle = tokio::spawn(async move {
            let days = month_days(month_index, today).unwrap_or_default();
            if days.is_empty() {
                warn!(month_index, "Invalid month index");
            }

            let snapshots = match self.load_snapshots().await {
                Ok(snapshots) => Some(snapshots),
                Err(e) => {
                    error!(month_index, error = %e, "Failed to load snapshots for series");
                    None
                }
            };

            if let Some(snapshots) = snapshots {
                for day in &days {
                    let point = self.point(&snapshots, *day);
                    if tx.send(SeriesEvent::Point(point)).await.is_err() {
                        debug!(month_index, "Series receiver dropped");
                        return;
                    }
                }
            }

            let _ = tx.send(SeriesEvent::Done).await;
            info!(month_index, points = days.len(), "Performance series streamed");
        });
        SeriesStream { events, handle }
    }

    /// Daily USD capital of a wallet's accounts over `[from, to]`.
    pub async fn capital_range(
        &self,
        wallet_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CapitalPoint>, StoreError> {
        if from > to {
            return Ok(Vec::new());
        }
        let snapshots = self.load_snapshots().await?;
        let wallet: Vec<&Account> = snapshots
            .accounts
            .iter()
            .filter(|a| a.wallet_id == Some(wallet_id))
            .collect();

        let points = from
            .iter_days()
            .take_while(|day| *day <= to)
            .map(|date| {
                let end = day_end(date);
                let balance = wallet
                    .iter()
                    .filter_map(|a| {
                        snapshots
                            .latest(a.id, end)
                            .map(|s| self.rates.convert_to_usd(s.balance, &a.currency))
                    })
                    .sum::<Decimal>()
                    .round_dp(2);
                CapitalPoint { date, balance }
            })
            .collect();
        Ok(points)
    }

    async fn load_snapshots(&self) -> Result<Snapshots, StoreError> {
        let demo_accounts: HashSet<i64> = self
            .store
            .list_records::<Terminal>()
            .await?
            .into_iter()
            .filter(|t| t.demo)
            .filter_map(|t| t.account_id)
            .collect();

        let accounts: Vec<Account> = self
            .store
            .list_records::<Account>()
            .await?
            .into_iter()
            .filter(|a| !demo_accounts.contains(&a.id))
            .collect();

        let mut states: HashMap<i64, Vec<AccountState>> = HashMap::new();
        for state in self.store.list_records::<AccountState>().await? {
            states.entry(state.account_id).or_default().push(state);
        }
        for list in states.values_mut() {
            list.sort_by_key(|s| s.date);
        }

        Ok(Snapshots { accounts, states })
    }

    fn point(&self, snapshots: &Snapshots, date: NaiveDate) -> TimeStat {
        let start = date.and_time(NaiveTime::MIN);
        let end = day_end(date);
        let mut stat = TimeStat::new(date.day(), date, TimePeriod::Daily);

        for account in &snapshots.accounts {
            let (Some(opening), Some(closing)) = (
                snapshots.latest(account.id, start),
                snapshots.latest(account.id, end),
            ) else {
                continue;
            };
            let opening = self.rates.convert_to_usd(opening.balance, &account.currency);
            let closing = self.rates.convert_to_usd(closing.balance, &account.currency);

            stat.checking_value += closing;
            stat.checking_change += opening;
            if account.is_investing() {
                stat.investing_value += closing;
                stat.investing_change += opening;
            }
        }

        stat.checking_change = stat.checking_value - stat.checking_change;
        stat.investing_change = stat.investing_value - stat.investing_change;
        if stat.checking_change > Decimal::ZERO {
            stat.gains = stat.checking_change;
        } else {
            stat.losses = stat.checking_change.abs();
        }

        stat.checking_value = stat.checking_value.round_dp(2);
        stat.checking_change = stat.checking_change.round_dp(2);
        stat.investing_value = stat.investing_value.round_dp(2);
        stat.investing_change = stat.investing_change.round_dp(2);
        stat.gains = stat.gains.round_dp(2);
        stat.losses = stat.losses.round_dp(2);
        stat
    }
}

fn day_end(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::minutes(DAY_END_MINUTES)
}

/// Days covered by a 0-based month index as seen on `today`.
fn month_days(month_index: u32, today: NaiveDate) -> Option<Vec<NaiveDate>> {
    if month_index > 11 {
        return None;
    }
    let month = month_index + 1;
    let year = if today.month() < month {
        today.year() - 1
    } else {
        today.year()
    };
    let last = if year == today.year() && month == today.month() {
        today.day()
    } else {
        days_in_month(year, month)?
    };
    (1..=last)
        .map(|day| NaiveDate::from_ymd_opt(year, month, day))
        .collect()
}
