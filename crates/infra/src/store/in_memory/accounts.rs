use async_trait::async_trait;
use chrono::{DateTime, Utc};

use forgepay_accounting::{Account, AccountSearchConditions, HoldResolution, PendingTransaction};
use forgepay_core::{AccountNumber, TransactionId, WriteOutcome};

use super::Collection;
use crate::store::{AccountStore, StoreResult};

/// In-memory account store.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: Collection<Account>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn insert(&self, account: Account) -> StoreResult<Account> {
        self.accounts.insert(account)
    }

    async fn get(&self, account_number: &AccountNumber) -> StoreResult<Option<Account>> {
        self.accounts.get(account_number)
    }

    async fn close_if_idle(
        &self,
        account_number: &AccountNumber,
        close_date: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Account>> {
        self.accounts.find_one_and_update(
            account_number,
            |account| account.can_close(),
            |account| account.close(close_date),
        )
    }

    async fn authorize(
        &self,
        account_number: &AccountNumber,
        hold: PendingTransaction,
    ) -> StoreResult<WriteOutcome<Account>> {
        let candidate = hold.clone();
        self.accounts.find_one_and_update(
            account_number,
            |account| account.can_authorize(&candidate),
            |account| account.authorize(hold),
        )
    }

    async fn start_pending(
        &self,
        account_number: &AccountNumber,
        hold: PendingTransaction,
    ) -> StoreResult<WriteOutcome<Account>> {
        let candidate = hold.clone();
        self.accounts.find_one_and_update(
            account_number,
            |account| account.can_start(&candidate),
            |account| account.start(hold),
        )
    }

    async fn resolve_hold(
        &self,
        account_number: &AccountNumber,
        transaction_id: &TransactionId,
        resolution: HoldResolution,
        amount: i64,
    ) -> StoreResult<WriteOutcome<Account>> {
        self.accounts.find_one_and_update(
            account_number,
            |account| account.has_hold(transaction_id),
            |account| {
                account.resolve_hold(transaction_id, resolution, amount);
            },
        )
    }

    async fn search(&self, conditions: &AccountSearchConditions) -> StoreResult<Vec<Account>> {
        self.accounts.query(
            |account| conditions.matches(account),
            |account| account.account_number.clone(),
            Some(conditions.limit),
        )
    }
}
