//! Accounts, holds and the rules every conditional ledger write enforces.
//!
//! Stores evaluate the `can_*` predicates as the condition of a single atomic
//! update and apply the matching mutation. When the condition misses, the
//! `classify_*` functions turn a re-read of the record into a caller-facing
//! error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forgepay_core::{AccountNumber, DomainError, DomainResult, Entity, TransactionId};
use forgepay_transactions::{TransactionRef, TransactionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountStatus {
    Opened,
    Closed,
}

forgepay_core::string_enum!(AccountStatus, "status", [Opened, Closed]);

/// A hold: money reserved on (or expected by) an account until its
/// transaction settles or is voided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub id: TransactionId,
    pub type_of: TransactionType,
    pub amount: i64,
}

impl PendingTransaction {
    pub fn new(transaction: TransactionRef, amount: i64) -> Self {
        Self {
            id: transaction.id,
            type_of: transaction.type_of,
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_number: AccountNumber,
    pub name: String,
    /// Settled funds, minor units.
    pub balance: i64,
    /// `balance` minus outstanding debit holds.
    pub available_balance: i64,
    pub pending_transactions: Vec<PendingTransaction>,
    pub status: AccountStatus,
    pub open_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_date: Option<DateTime<Utc>>,
}

impl Entity for Account {
    type Id = AccountNumber;

    fn id(&self) -> &Self::Id {
        &self.account_number
    }
}

impl Account {
    pub fn open(
        account_number: AccountNumber,
        name: impl Into<String>,
        initial_balance: i64,
        open_date: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if initial_balance < 0 {
            return Err(DomainError::argument(
                "initialBalance",
                "must not be negative",
            ));
        }
        Ok(Self {
            account_number,
            name: name.into(),
            balance: initial_balance,
            available_balance: initial_balance,
            pending_transactions: Vec::new(),
            status: AccountStatus::Opened,
            open_date,
            close_date: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == AccountStatus::Opened
    }

    pub fn has_hold(&self, transaction_id: &TransactionId) -> bool {
        self.pending_transactions
            .iter()
            .any(|hold| &hold.id == transaction_id)
    }

    pub fn can_close(&self) -> bool {
        self.is_open() && self.pending_transactions.is_empty()
    }

    pub fn close(&mut self, close_date: DateTime<Utc>) {
        self.status = AccountStatus::Closed;
        self.close_date = Some(close_date);
    }

    /// An account carries at most one hold per transaction.
    pub fn can_authorize(&self, hold: &PendingTransaction) -> bool {
        self.is_open() && !self.has_hold(&hold.id) && self.available_balance >= hold.amount
    }

    /// Reserves `hold.amount` of the available balance.
    pub fn authorize(&mut self, hold: PendingTransaction) {
        self.available_balance -= hold.amount;
        self.pending_transactions.push(hold);
    }

    pub fn can_start(&self, hold: &PendingTransaction) -> bool {
        self.is_open() && !self.has_hold(&hold.id)
    }

    /// Records an expected credit; balances are untouched until settlement.
    pub fn start(&mut self, hold: PendingTransaction) {
        self.pending_transactions.push(hold);
    }

    /// Applies `resolution` for the hold keyed by `transaction_id` and removes
    /// it. Does nothing and returns `false` if the hold is absent.
    pub fn resolve_hold(
        &mut self,
        transaction_id: &TransactionId,
        resolution: HoldResolution,
        amount: i64,
    ) -> bool {
        if !self.has_hold(transaction_id) {
            return false;
        }
        let (balance, available) = resolution.deltas(amount);
        self.balance += balance;
        self.available_balance += available;
        self.pending_transactions
            .retain(|hold| &hold.id != transaction_id);
        true
    }
}

/// How a hold is finalized on one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HoldResolution {
    /// Money leaves the source account.
    SettleDebit,
    /// Money arrives at the destination account.
    SettleCredit,
    /// The source account's reservation is released.
    VoidDebit,
    /// The destination account stops expecting the credit.
    VoidCredit,
}

forgepay_core::string_enum!(
    HoldResolution,
    "resolution",
    [SettleDebit, SettleCredit, VoidDebit, VoidCredit]
);

impl HoldResolution {
    /// `(balance, available_balance)` deltas for a hold of `amount`.
    pub fn deltas(&self, amount: i64) -> (i64, i64) {
        match self {
            Self::SettleDebit => (-amount, 0),
            Self::SettleCredit => (amount, amount),
            Self::VoidDebit => (0, amount),
            Self::VoidCredit => (0, 0),
        }
    }
}

/// Settle or void request covering both legs of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldRelease {
    #[serde(default)]
    pub from_account_number: Option<AccountNumber>,
    #[serde(default)]
    pub to_account_number: Option<AccountNumber>,
    pub amount: i64,
    pub transaction_id: TransactionId,
}

/// Resolves a `close` whose conditional write matched nothing.
///
/// Closing an already closed account succeeds.
pub fn classify_close_miss(current: Option<Account>) -> DomainResult<Account> {
    match current {
        Some(account) if account.status == AccountStatus::Closed => Ok(account),
        Some(account) if !account.pending_transactions.is_empty() => Err(
            DomainError::argument("accountNumber", "Pending transactions exist"),
        ),
        _ => Err(DomainError::not_found("Account")),
    }
}

/// Resolves an `authorize_amount` whose conditional write matched nothing.
///
/// A hold already placed for the same transaction is a repeat of an earlier
/// call and succeeds without reserving again.
pub fn classify_authorize_miss(
    current: Option<Account>,
    hold: &PendingTransaction,
) -> DomainResult<Account> {
    match current {
        Some(account) if account.has_hold(&hold.id) => Ok(account),
        Some(account) if account.status == AccountStatus::Closed => Err(DomainError::argument(
            "accountNumber",
            "Account already closed",
        )),
        Some(account) if account.available_balance < hold.amount => {
            Err(DomainError::argument("amount", "Insufficient balance"))
        }
        _ => Err(DomainError::not_found("Account")),
    }
}

/// Resolves a `start_transaction` whose conditional write matched nothing.
/// Same repeat rule as [`classify_authorize_miss`].
pub fn classify_start_miss(
    current: Option<Account>,
    hold: &PendingTransaction,
) -> DomainResult<Account> {
    match current {
        Some(account) if account.has_hold(&hold.id) => Ok(account),
        Some(account) if account.status == AccountStatus::Closed => Err(DomainError::argument(
            "accountNumber",
            "Account already closed",
        )),
        _ => Err(DomainError::not_found("Account")),
    }
}

/// Account projection without holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_number: AccountNumber,
    pub name: String,
    pub balance: i64,
    pub available_balance: i64,
    pub status: AccountStatus,
    pub open_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_date: Option<DateTime<Utc>>,
}

impl From<Account> for AccountSummary {
    fn from(account: Account) -> Self {
        Self {
            account_number: account.account_number,
            name: account.name,
            balance: account.balance,
            available_balance: account.available_balance,
            status: account.status,
            open_date: account.open_date,
            close_date: account.close_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSearchConditions {
    #[serde(default)]
    pub account_numbers: Option<Vec<AccountNumber>>,
    #[serde(default)]
    pub statuses: Option<Vec<AccountStatus>>,
    /// Case-insensitive substring of the account name.
    #[serde(default)]
    pub name: Option<String>,
    pub limit: usize,
}

impl Default for AccountSearchConditions {
    fn default() -> Self {
        Self {
            account_numbers: None,
            statuses: None,
            name: None,
            limit: 100,
        }
    }
}

impl AccountSearchConditions {
    pub fn matches(&self, account: &Account) -> bool {
        let number_ok = self
            .account_numbers
            .as_ref()
            .map_or(true, |numbers| numbers.contains(&account.account_number));
        let status_ok = self
            .statuses
            .as_ref()
            .map_or(true, |statuses| statuses.contains(&account.status));
        let name_ok = self.name.as_ref().map_or(true, |needle| {
            account
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        number_ok && status_ok && name_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_account(initial: i64) -> Account {
        Account::open(AccountNumber::new("A-1").unwrap(), "Main", initial, Utc::now()).unwrap()
    }

    fn hold(type_of: TransactionType, amount: i64) -> PendingTransaction {
        PendingTransaction::new(
            TransactionRef {
                type_of,
                id: TransactionId::new(),
            },
            amount,
        )
    }

    #[test]
    fn open_rejects_negative_initial_balance() {
        assert!(matches!(
            Account::open(AccountNumber::new("A").unwrap(), "x", -1, Utc::now()),
            Err(DomainError::Argument { .. })
        ));
    }

    #[test]
    fn authorize_then_settle_moves_balance() {
        let mut account = test_account(1000);
        let h = hold(TransactionType::Withdraw, 400);
        let id = h.id;

        assert!(account.can_authorize(&h));
        account.authorize(h);
        assert_eq!((account.balance, account.available_balance), (1000, 600));

        assert!(account.resolve_hold(&id, HoldResolution::SettleDebit, 400));
        assert_eq!((account.balance, account.available_balance), (600, 600));
        assert!(account.pending_transactions.is_empty());

        // A redrive finds no hold and changes nothing.
        assert!(!account.resolve_hold(&id, HoldResolution::SettleDebit, 400));
        assert_eq!((account.balance, account.available_balance), (600, 600));
    }

    #[test]
    fn authorize_then_void_restores_available() {
        let mut account = test_account(1000);
        let h = hold(TransactionType::Transfer, 250);
        let id = h.id;
        account.authorize(h);
        assert!(account.resolve_hold(&id, HoldResolution::VoidDebit, 250));
        assert_eq!((account.balance, account.available_balance), (1000, 1000));
    }

    #[test]
    fn credit_hold_changes_nothing_until_settled() {
        let mut account = test_account(0);
        let h = hold(TransactionType::Deposit, 300);
        let id = h.id;
        account.start(h);
        assert_eq!((account.balance, account.available_balance), (0, 0));
        assert!(!account.can_close());

        assert!(account.resolve_hold(&id, HoldResolution::SettleCredit, 300));
        assert_eq!((account.balance, account.available_balance), (300, 300));
        assert!(account.can_close());
    }

    #[test]
    fn classify_close_miss_cases() {
        let mut closed = test_account(0);
        closed.close(Utc::now());
        assert_eq!(classify_close_miss(Some(closed.clone())).unwrap(), closed);

        let mut busy = test_account(10);
        busy.start(hold(TransactionType::Deposit, 5));
        assert_eq!(
            classify_close_miss(Some(busy)),
            Err(DomainError::argument("accountNumber", "Pending transactions exist"))
        );

        assert!(matches!(
            classify_close_miss(None),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[test]
    fn classify_authorize_miss_cases() {
        let account = test_account(600);
        assert_eq!(
            classify_authorize_miss(Some(account.clone()), &hold(TransactionType::Withdraw, 9999)),
            Err(DomainError::argument("amount", "Insufficient balance"))
        );

        let mut closed = test_account(600);
        closed.close(Utc::now());
        assert!(matches!(
            classify_authorize_miss(Some(closed), &hold(TransactionType::Withdraw, 1)),
            Err(DomainError::Argument { .. })
        ));

        // Open with enough funds means the record changed under us.
        assert!(matches!(
            classify_authorize_miss(Some(account), &hold(TransactionType::Withdraw, 1)),
            Err(DomainError::NotFound { .. })
        ));
        assert!(matches!(
            classify_start_miss(None, &hold(TransactionType::Deposit, 1)),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[test]
    fn second_hold_for_the_same_transaction_is_refused() {
        let mut account = test_account(1000);
        let first = hold(TransactionType::Transfer, 400);
        let repeat = first.clone();
        account.authorize(first);

        assert!(!account.can_authorize(&repeat));
        assert!(!account.can_start(&repeat));
        assert_eq!(
            classify_authorize_miss(Some(account.clone()), &repeat),
            Ok(account.clone())
        );
        assert_eq!(classify_start_miss(Some(account.clone()), &repeat), Ok(account.clone()));

        let id = repeat.id;
        assert!(account.resolve_hold(&id, HoldResolution::SettleDebit, 400));
        assert_eq!((account.balance, account.available_balance), (600, 600));
    }

    #[test]
    fn search_conditions_match_name_case_insensitively() {
        let account = test_account(0);
        let conditions = AccountSearchConditions {
            name: Some("MAI".into()),
            statuses: Some(vec![AccountStatus::Opened]),
            ..Default::default()
        };
        assert!(conditions.matches(&account));

        let conditions = AccountSearchConditions {
            statuses: Some(vec![AccountStatus::Closed]),
            ..Default::default()
        };
        assert!(!conditions.matches(&account));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Authorize(i64),
        Start(i64),
        Settle(usize),
        Void(usize),
        Repeat(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..5_000).prop_map(Op::Authorize),
            (1i64..5_000).prop_map(Op::Start),
            any::<usize>().prop_map(Op::Settle),
            any::<usize>().prop_map(Op::Void),
            any::<usize>().prop_map(Op::Repeat),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for any sequence of holds, settlements and voids the
        /// available balance never exceeds the balance, and it always equals
        /// the balance minus the outstanding debit holds.
        #[test]
        fn available_never_exceeds_balance(
            initial in 0i64..10_000,
            ops in prop::collection::vec(op_strategy(), 1..40)
        ) {
            let mut account = test_account(initial);
            // (transaction id, is debit, amount)
            let mut open_holds: Vec<(TransactionId, bool, i64)> = Vec::new();

            for op in ops {
                match op {
                    Op::Authorize(amount) => {
                        let h = hold(TransactionType::Withdraw, amount);
                        if account.can_authorize(&h) {
                            open_holds.push((h.id, true, amount));
                            account.authorize(h);
                        }
                    }
                    Op::Start(amount) => {
                        let h = hold(TransactionType::Deposit, amount);
                        prop_assert!(account.can_start(&h));
                        open_holds.push((h.id, false, amount));
                        account.start(h);
                    }
                    Op::Repeat(i) if !open_holds.is_empty() => {
                        let (id, _, amount) = open_holds[i % open_holds.len()];
                        let repeat = PendingTransaction {
                            id,
                            type_of: TransactionType::Transfer,
                            amount,
                        };
                        prop_assert!(!account.can_authorize(&repeat));
                        prop_assert!(!account.can_start(&repeat));
                    }
                    Op::Repeat(_) => {}
                    Op::Settle(i) | Op::Void(i) if !open_holds.is_empty() => {
                        let (id, is_debit, amount) = open_holds.remove(i % open_holds.len());
                        let settle = matches!(op, Op::Settle(_));
                        let resolution = match (settle, is_debit) {
                            (true, true) => HoldResolution::SettleDebit,
                            (true, false) => HoldResolution::SettleCredit,
                            (false, true) => HoldResolution::VoidDebit,
                            (false, false) => HoldResolution::VoidCredit,
                        };
                        prop_assert!(account.resolve_hold(&id, resolution, amount));
                    }
                    Op::Settle(_) | Op::Void(_) => {}
                }

                let reserved: i64 = open_holds
                    .iter()
                    .filter(|(_, is_debit, _)| *is_debit)
                    .map(|(_, _, amount)| amount)
                    .sum();
                prop_assert!(account.available_balance <= account.balance);
                prop_assert!(account.available_balance >= 0);
                prop_assert_eq!(account.available_balance, account.balance - reserved);
                prop_assert_eq!(account.pending_transactions.len(), open_holds.len());
            }
        }
    }
}
