//! Account ledger service.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use forgepay_accounting::{
    classify_authorize_miss, classify_close_miss, classify_start_miss, Account,
    AccountSearchConditions, AccountSummary, HoldRelease, HoldResolution, PendingTransaction,
};
use forgepay_core::{AccountNumber, DomainError, DomainResult, TransactionId, WriteOutcome};
use forgepay_observability::record_outcome;
use forgepay_transactions::TransactionRef;

use crate::store::{AccountStore, StoreError};

/// Owns account balances and holds.
///
/// Every mutation is one conditional write; misses are classified from a
/// re-read of the account.
#[derive(Clone)]
pub struct AccountLedger {
    store: Arc<dyn AccountStore>,
}

fn positive(amount: i64) -> DomainResult<()> {
    if amount <= 0 {
        return Err(DomainError::argument("amount", "must be positive"));
    }
    Ok(())
}

impl AccountLedger {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    pub async fn open(
        &self,
        account_number: AccountNumber,
        name: impl Into<String>,
        initial_balance: i64,
        open_date: DateTime<Utc>,
    ) -> DomainResult<Account> {
        let key = account_number.clone();
        let result = match Account::open(account_number, name, initial_balance, open_date) {
            Ok(account) => self.store.insert(account).await.map_err(|e| match e {
                StoreError::Duplicate(_) => {
                    DomainError::already_in_use("Account", ["account_number"])
                }
                other => other.into(),
            }),
            Err(err) => Err(err),
        };
        record_outcome("open", &key, &result);
        result
    }

    pub async fn close(
        &self,
        account_number: &AccountNumber,
        close_date: DateTime<Utc>,
    ) -> DomainResult<Account> {
        let result: DomainResult<Account> = async {
            match self.store.close_if_idle(account_number, close_date).await? {
                WriteOutcome::Applied(account) => Ok(account),
                WriteOutcome::NoMatch => {
                    let current = self.store.get(account_number).await?;
                    classify_close_miss(current)
                }
            }
        }
        .await;
        record_outcome("close", account_number, &result);
        result
    }

    pub async fn find_by_account_number(
        &self,
        account_number: &AccountNumber,
    ) -> DomainResult<Account> {
        self.store
            .get(account_number)
            .await?
            .ok_or_else(|| DomainError::not_found("Account"))
    }

    /// Reserve `amount` on the source account of `transaction`. Repeating the
    /// call for the same transaction returns the account unchanged.
    pub async fn authorize_amount(
        &self,
        account_number: &AccountNumber,
        amount: i64,
        transaction: TransactionRef,
    ) -> DomainResult<Account> {
        let result: DomainResult<Account> = async {
            positive(amount)?;
            let hold = PendingTransaction::new(transaction, amount);
            match self.store.authorize(account_number, hold.clone()).await? {
                WriteOutcome::Applied(account) => Ok(account),
                WriteOutcome::NoMatch => {
                    let current = self.store.get(account_number).await?;
                    classify_authorize_miss(current, &hold)
                }
            }
        }
        .await;
        record_outcome("authorize_amount", account_number, &result);
        result
    }

    /// Record an expected credit of `amount` on the destination account.
    pub async fn start_transaction(
        &self,
        account_number: &AccountNumber,
        amount: i64,
        transaction: TransactionRef,
    ) -> DomainResult<Account> {
        let result: DomainResult<Account> = async {
            positive(amount)?;
            let hold = PendingTransaction::new(transaction, amount);
            match self.store.start_pending(account_number, hold.clone()).await? {
                WriteOutcome::Applied(account) => Ok(account),
                WriteOutcome::NoMatch => {
                    let current = self.store.get(account_number).await?;
                    classify_start_miss(current, &hold)
                }
            }
        }
        .await;
        record_outcome("start_transaction", account_number, &result);
        result
    }

    /// Apply both legs of a transaction. Legs whose hold is already gone are
    /// skipped, so redriving a partially applied settlement is safe.
    pub async fn settle_transaction(&self, release: &HoldRelease) -> DomainResult<()> {
        let result = self
            .release(release, HoldResolution::SettleDebit, HoldResolution::SettleCredit)
            .await;
        record_outcome("settle_transaction", &release.transaction_id, &result);
        result
    }

    /// Undo both legs of a transaction. Same idempotency as settlement.
    pub async fn void_transaction(&self, release: &HoldRelease) -> DomainResult<()> {
        let result = self
            .release(release, HoldResolution::VoidDebit, HoldResolution::VoidCredit)
            .await;
        record_outcome("void_transaction", &release.transaction_id, &result);
        result
    }

    async fn release(
        &self,
        release: &HoldRelease,
        debit: HoldResolution,
        credit: HoldResolution,
    ) -> DomainResult<()> {
        if let Some(from) = &release.from_account_number {
            self.resolve_leg(from, &release.transaction_id, debit, release.amount)
                .await?;
        }
        if let Some(to) = &release.to_account_number {
            self.resolve_leg(to, &release.transaction_id, credit, release.amount)
                .await?;
        }
        Ok(())
    }

    async fn resolve_leg(
        &self,
        account_number: &AccountNumber,
        transaction_id: &TransactionId,
        resolution: HoldResolution,
        amount: i64,
    ) -> DomainResult<()> {
        let outcome = self
            .store
            .resolve_hold(account_number, transaction_id, resolution, amount)
            .await?;
        if !outcome.is_applied() {
            debug!(
                account_number = %account_number,
                transaction_id = %transaction_id,
                resolution = %resolution,
                "hold already resolved or absent"
            );
        }
        Ok(())
    }

    pub async fn search(
        &self,
        conditions: &AccountSearchConditions,
    ) -> DomainResult<Vec<AccountSummary>> {
        let accounts = self.store.search(conditions).await?;
        Ok(accounts.into_iter().map(AccountSummary::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgepay_core::TransactionId;
    use forgepay_transactions::TransactionType;

    use crate::store::InMemoryAccountStore;

    fn ledger() -> AccountLedger {
        AccountLedger::new(Arc::new(InMemoryAccountStore::new()))
    }

    fn number(n: &str) -> AccountNumber {
        AccountNumber::new(n).unwrap()
    }

    fn tx(type_of: TransactionType) -> TransactionRef {
        TransactionRef {
            type_of,
            id: TransactionId::new(),
        }
    }

    #[tokio::test]
    async fn open_twice_is_already_in_use() {
        let ledger = ledger();
        ledger.open(number("A"), "Main", 100, Utc::now()).await.unwrap();
        let err = ledger.open(number("A"), "Other", 0, Utc::now()).await.unwrap_err();
        assert!(matches!(err, DomainError::AlreadyInUse { .. }));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_guarded_by_holds() {
        let ledger = ledger();
        ledger.open(number("A"), "Main", 100, Utc::now()).await.unwrap();
        let hold = tx(TransactionType::Withdraw);
        ledger.authorize_amount(&number("A"), 10, hold).await.unwrap();

        let err = ledger.close(&number("A"), Utc::now()).await.unwrap_err();
        assert!(matches!(err, DomainError::Argument { .. }));
        let account = ledger.find_by_account_number(&number("A")).await.unwrap();
        assert_eq!(account.status, forgepay_accounting::AccountStatus::Opened);

        ledger
            .void_transaction(&HoldRelease {
                from_account_number: Some(number("A")),
                to_account_number: None,
                amount: 10,
                transaction_id: hold.id,
            })
            .await
            .unwrap();

        let closed = ledger.close(&number("A"), Utc::now()).await.unwrap();
        let again = ledger.close(&number("A"), Utc::now()).await.unwrap();
        assert_eq!(closed, again);

        let err = ledger.close(&number("missing"), Utc::now()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn authorize_rejects_closed_and_unknown_accounts() {
        let ledger = ledger();
        ledger.open(number("A"), "Main", 100, Utc::now()).await.unwrap();
        ledger.close(&number("A"), Utc::now()).await.unwrap();

        let err = ledger
            .authorize_amount(&number("A"), 1, tx(TransactionType::Withdraw))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::argument("accountNumber", "Account already closed")
        );

        let err = ledger
            .start_transaction(&number("missing"), 1, tx(TransactionType::Deposit))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));

        let err = ledger
            .authorize_amount(&number("A"), 0, tx(TransactionType::Withdraw))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Argument { .. }));
    }

    #[tokio::test]
    async fn transfer_settlement_is_idempotent() {
        let ledger = ledger();
        ledger.open(number("A"), "Source", 1000, Utc::now()).await.unwrap();
        ledger.open(number("B"), "Destination", 0, Utc::now()).await.unwrap();

        let transfer = tx(TransactionType::Transfer);
        ledger.authorize_amount(&number("A"), 300, transfer).await.unwrap();
        ledger.start_transaction(&number("B"), 300, transfer).await.unwrap();

        let release = HoldRelease {
            from_account_number: Some(number("A")),
            to_account_number: Some(number("B")),
            amount: 300,
            transaction_id: transfer.id,
        };
        ledger.settle_transaction(&release).await.unwrap();
        ledger.settle_transaction(&release).await.unwrap();

        let a = ledger.find_by_account_number(&number("A")).await.unwrap();
        let b = ledger.find_by_account_number(&number("B")).await.unwrap();
        assert_eq!((a.balance, a.available_balance), (700, 700));
        assert_eq!((b.balance, b.available_balance), (300, 300));
        assert!(a.pending_transactions.is_empty() && b.pending_transactions.is_empty());
    }

    #[tokio::test]
    async fn repeated_authorize_reserves_once() {
        let ledger = ledger();
        ledger.open(number("A"), "Main", 1000, Utc::now()).await.unwrap();
        ledger.open(number("B"), "Other", 0, Utc::now()).await.unwrap();
        let transfer = tx(TransactionType::Transfer);

        let first = ledger.authorize_amount(&number("A"), 400, transfer).await.unwrap();
        let again = ledger.authorize_amount(&number("A"), 400, transfer).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(again.available_balance, 600);
        assert_eq!(again.pending_transactions.len(), 1);

        ledger.start_transaction(&number("B"), 400, transfer).await.unwrap();
        let b = ledger.start_transaction(&number("B"), 400, transfer).await.unwrap();
        assert_eq!(b.pending_transactions.len(), 1);

        ledger
            .settle_transaction(&HoldRelease {
                from_account_number: Some(number("A")),
                to_account_number: Some(number("B")),
                amount: 400,
                transaction_id: transfer.id,
            })
            .await
            .unwrap();

        let a = ledger.find_by_account_number(&number("A")).await.unwrap();
        let b = ledger.find_by_account_number(&number("B")).await.unwrap();
        assert_eq!((a.balance, a.available_balance), (600, 600));
        assert_eq!((b.balance, b.available_balance), (400, 400));
        assert!(a.pending_transactions.is_empty() && b.pending_transactions.is_empty());
    }

    #[tokio::test]
    async fn search_orders_by_account_number_without_holds() {
        let ledger = ledger();
        for (n, name) in [("C", "Gamma"), ("A", "Alpha"), ("B", "alphabet")] {
            ledger.open(number(n), name, 0, Utc::now()).await.unwrap();
        }
        let found = ledger
            .search(&AccountSearchConditions {
                name: Some("alpha".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let numbers: Vec<_> = found.iter().map(|a| a.account_number.as_str()).collect();
        assert_eq!(numbers, vec!["A", "B"]);
    }
}
