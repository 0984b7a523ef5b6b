use chrono::{Local, NaiveDateTime};
use rust_decimal::Decimal;
use sighub_core::*;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const AUTOUPDATE_COMMENT: &str = "Autoupdate";

/// Keeps account balances and their daily snapshots current.
pub struct AccountLedger {
    store: Arc<dyn Store>,
    /// Serializes the read-modify-write of the daily snapshot.
    write_lock: Mutex<()>,
}

impl AccountLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Record a balance report from the terminal logged into `account_number`.
    ///
    /// Returns `Ok(false)` when no terminal or account matches.
    pub async fn update_balance(
        &self,
        account_number: i64,
        balance: Decimal,
        equity: Decimal,
    ) -> Result<bool, StoreError> {
        self.update_balance_at(account_number, balance, equity, Local::now().naive_local())
            .await
    }

    pub async fn update_balance_at(
        &self,
        account_number: i64,
        balance: Decimal,
        equity: Decimal,
        now: NaiveDateTime,
    ) -> Result<bool, StoreError> {
        let Some(mut account) = self.account_for(account_number).await? else {
            debug!(account = account_number, "No account for balance update");
            return Ok(false);
        };

        let _guard = self.write_lock.lock().await;

        account.balance = balance;
        account.equity = equity;
        account.last_update = Some(now);
        let account_id = account.id;
        self.store.update_record(account).await?;

        let today = now.date();
        let latest = self
            .store
            .list_records::<AccountState>()
            .await?
            .into_iter()
            .filter(|s| s.account_id == account_id)
            .max_by_key(|s| (s.date, s.id));

        match latest {
            Some(mut state) if state.date.date() == today => {
                state.date = now;
                state.balance = balance;
                state.comment = Some(AUTOUPDATE_COMMENT.to_string());
                self.store.update_record(state).await?;
            }
            _ => {
                self.store
                    .insert_record(AccountState {
                        id: 0,
                        account_id,
                        date: now,
                        balance,
                        comment: Some(AUTOUPDATE_COMMENT.to_string()),
                    })
                    .await?;
            }
        }

        info!(account = account_number, %balance, %equity, "Balance updated");
        Ok(true)
    }

    async fn account_for(&self, account_number: i64) -> Result<Option<Account>, StoreError> {
        let terminal = self
            .store
            .list_records::<Terminal>()
            .await?
            .into_iter()
            .find(|t| t.account_number == account_number);

        let Some(account_id) = terminal.and_then(|t| t.account_id) else {
            return Ok(None);
        };

        let account = self.store.get_record::<Account>(account_id).await?;
        if account.is_none() {
            warn!(account = account_number, account_id, "Terminal points at a missing account");
        }
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use rust_decimal_macros::dec;

    async fn ledger() -> (Arc<FlakyStore>, AccountLedger) {
        let store = Arc::new(FlakyStore::new());
        store.seed(account(9, "USD", 0)).await;
        store.seed(terminal(5, 1001, 9, false)).await;
        let ledger = AccountLedger::new(store.clone());
        (store, ledger)
    }

    async fn states(store: &FlakyStore) -> Vec<AccountState> {
        store.list_records::<AccountState>().await.unwrap()
    }

    #[tokio::test]
    async fn test_balance_check_updates_account_and_snapshot() {
        let (store, ledger) = ledger().await;
        let now = at(2024, 3, 5, 14, 0);

        let updated = ledger
            .update_balance_at(1001, dec!(5000.0), dec!(5010.0), now)
            .await
            .unwrap();
        assert!(updated);

        let account = store.get_record::<Account>(9).await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(5000.0));
        assert_eq!(account.equity, dec!(5010.0));
        assert_eq!(account.last_update, Some(now));

        let states = states(&store).await;
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].balance, dec!(5000.0));
        assert_eq!(states[0].comment.as_deref(), Some("Autoupdate"));
    }

    #[tokio::test]
    async fn test_same_day_updates_keep_one_snapshot() {
        let (store, ledger) = ledger().await;
        ledger
            .update_balance_at(1001, dec!(100), dec!(100), at(2024, 3, 5, 9, 0))
            .await
            .unwrap();
        ledger
            .update_balance_at(1001, dec!(120), dec!(121), at(2024, 3, 5, 18, 30))
            .await
            .unwrap();

        let states = states(&store).await;
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].balance, dec!(120));
        assert_eq!(states[0].date, at(2024, 3, 5, 18, 30));
    }

    #[tokio::test]
    async fn test_new_day_inserts_new_snapshot() {
        let (store, ledger) = ledger().await;
        store
            .seed(state(9, at(2024, 3, 4, 23, 0), dec!(90)))
            .await;
        ledger
            .update_balance_at(1001, dec!(100), dec!(100), at(2024, 3, 5, 9, 0))
            .await
            .unwrap();

        let mut balances: Vec<Decimal> = states(&store).await.iter().map(|s| s.balance).collect();
        balances.sort();
        assert_eq!(balances, vec![dec!(90), dec!(100)]);
    }

    #[tokio::test]
    async fn test_unknown_terminal_is_noop() {
        let (store, ledger) = ledger().await;
        let updated = ledger
            .update_balance_at(4242, dec!(1), dec!(1), at(2024, 3, 5, 9, 0))
            .await
            .unwrap();
        assert!(!updated);
        assert!(states(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let (store, ledger) = ledger().await;
        store.set_failing(true);
        let result = ledger
            .update_balance_at(1001, dec!(1), dec!(1), at(2024, 3, 5, 9, 0))
            .await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }
}
